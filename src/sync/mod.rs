pub mod google_api;
pub mod google_auth;
pub mod merge;
pub mod sync_engine;

pub use sync_engine::{FetchOutcome, PushSummary, SyncEngine, SyncError};
