//! Session identifier provider
//!
//! One opaque id per browsing session, generated on first use and kept in
//! session-scoped storage so later lookups (including after a restart over
//! the same session store) return the same value.

use funnel_common::{uuid_utils, KeyValueStore};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Session-scoped storage key for the session id
pub const SESSION_ID_KEY: &str = "funnel_session_id";

pub struct SessionIdProvider {
    store: Arc<dyn KeyValueStore>,
    cached: Mutex<Option<String>>,
}

impl SessionIdProvider {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    /// Current session id, generating and storing one on first call
    ///
    /// The cache lock is held across read-check-write, so concurrent first
    /// calls agree on a single id. A store that cannot be read or written
    /// still yields a stable id for the lifetime of this provider.
    pub fn session_id(&self) -> String {
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let stored = match self.store.get(SESSION_ID_KEY) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!("Failed to read session id: {}", e);
                None
            }
        };

        let id = match stored {
            Some(id) => id,
            None => {
                let id = uuid_utils::generate().to_string();
                if let Err(e) = self.store.set(SESSION_ID_KEY, &id) {
                    warn!("Failed to store session id: {}", e);
                }
                debug!(session_id = %id, "Started new session");
                id
            }
        };

        *cached = Some(id.clone());
        id
    }
}
