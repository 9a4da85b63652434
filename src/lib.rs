pub mod calendar;
pub mod storage;
pub mod sync;
pub mod ui;

pub use calendar::{Calendar, CalendarMap, CalendarSet};
pub use sync::{FetchOutcome, PushSummary, SyncEngine, SyncError};
pub use ui::{UiNotifier, UiSignal};
