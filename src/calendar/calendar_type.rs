use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Calendars keyed by id, as persisted under the `calendars` store key.
pub type CalendarMap = BTreeMap<String, Calendar>;

/// Locally cached calendar. Only `selected` is a user preference; every other
/// field is overwritten from the remote list on each fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub access_role: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub foreground_color: String,
    #[serde(default)]
    pub background_color: String,
    #[serde(default)]
    pub color_id: String,
    #[serde(default)]
    pub selected: bool,
}

/// Whether a remote access role grants write access.
pub fn is_writable_role(role: Option<&str>) -> bool {
    matches!(role, Some("writer") | Some("owner"))
}
