//! Reconciliation between the locally cached calendar list and remote state.

use crate::calendar::{Calendar, CalendarMap, CalendarSet, is_writable_role};
use crate::sync::google_api::{CalendarPreference, RemoteCalendar};

/// Builds the cached record for a freshly fetched calendar. Descriptive fields
/// come from the remote entry; visibility comes from the stored record when
/// there is one.
pub fn merge_calendar(stored: Option<&Calendar>, remote: RemoteCalendar) -> Calendar {
    let selected = match stored {
        Some(stored) => stored.selected,
        None => remote.selected.unwrap_or(false),
    };

    Calendar {
        access_role: is_writable_role(remote.access_role.as_deref()),
        id: remote.id,
        summary: remote.summary,
        description: remote.description.unwrap_or_default(),
        foreground_color: remote.foreground_color.unwrap_or_default(),
        background_color: remote.background_color.unwrap_or_default(),
        color_id: remote.color_id.unwrap_or_default(),
        selected,
    }
}

/// Merges a complete remote list into the stored map. Stored calendars missing
/// from `remote` are dropped unless `retain_missing` is set.
pub fn merge_calendars(
    stored: &CalendarMap,
    remote: Vec<RemoteCalendar>,
    retain_missing: bool,
) -> CalendarMap {
    let mut merged = if retain_missing {
        stored.clone()
    } else {
        CalendarMap::new()
    };

    for calendar in remote {
        let calendar = merge_calendar(stored.get(&calendar.id), calendar);
        merged.insert(calendar.id.clone(), calendar);
    }

    merged
}

/// Recomputes visibility from set membership: a calendar is selected iff the
/// active set lists it. Prior selections are overwritten.
pub fn apply_active_set(calendars: &CalendarMap, active: &CalendarSet) -> CalendarMap {
    calendars
        .iter()
        .map(|(id, calendar)| {
            let mut calendar = calendar.clone();
            calendar.selected = active.contains(id);
            (id.clone(), calendar)
        })
        .collect()
}

pub fn preference_for(calendar: &Calendar, fallback_color_id: &str) -> CalendarPreference {
    let color_id = if calendar.color_id.is_empty() {
        fallback_color_id.to_string()
    } else {
        calendar.color_id.clone()
    };

    CalendarPreference {
        selected: calendar.selected,
        color_id,
    }
}
