//! # Funnel Common Library
//!
//! Shared code for the funnel tracking crates including:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - Key-value storage backends (durable and session-scoped)
//! - Utility functions for UUIDs and timestamps

pub mod config;
pub mod error;
pub mod storage;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
