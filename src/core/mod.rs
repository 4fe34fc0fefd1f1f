pub mod models;
pub mod poller;
pub mod tracker;

pub use models::{ResourceKind, ScopeKey, SyncState, TrackedJob, validate_identifier};
pub use poller::SyncPoller;
pub use tracker::{SyncTracker, TrackerEvent};
