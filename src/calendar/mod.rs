pub mod calendar_type;
pub mod calendar_set;

pub use calendar_type::{Calendar, CalendarMap, is_writable_role};
pub use calendar_set::{CalendarSet, SetError, active_set};
