//! funnel-tracker library - attribution capture and event tracking for the quiz funnel
//!
//! Captures marketing attribution from the entry URL, keeps it across visits,
//! and decorates every analytics event with it. Collectors may load after the
//! first events are tracked; those events wait for them.

pub mod answers;
pub mod app;
pub mod attribution;
pub mod collector;
pub mod funnel;
pub mod page;
pub mod params;
pub mod readiness;
pub mod session;
pub mod tracker;

pub use answers::{normalize_answer, AnswerStore, PlanWeeks};
pub use app::{CollectorSource, CollectorStatus, FunnelApp, FunnelStores};
pub use attribution::{Attribution, AttributionSnapshot, AttributionStore};
pub use funnel::{FunnelNavigator, Screen};
pub use params::{parse_query, parse_url, MarketingParam, MarketingParams, ParsedQuery};
pub use tracker::{DispatchOutcome, DispatchTicket, EventTracker};
