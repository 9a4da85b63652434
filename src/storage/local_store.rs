use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::calendar::calendar_set::StoredSets;
use crate::calendar::{CalendarMap, CalendarSet};

pub const CALENDARS_KEY: &str = "calendars";
pub const SETS_KEY: &str = "sets";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Failed to create store directory: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// String keys mapped to JSON values.
#[cfg_attr(test, automock)]
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::new(Connection::open(path)?);
        store.initialize()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self::new(Connection::open_in_memory()?);
        store.initialize()?;
        Ok(store)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

impl LocalStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let data: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let data = serde_json::to_string(value)?;
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, &data],
        )?;
        Ok(())
    }
}

pub fn load_calendars(store: &dyn LocalStore) -> Result<CalendarMap, StoreError> {
    match store.get(CALENDARS_KEY)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(CalendarMap::new()),
    }
}

pub fn save_calendars(store: &dyn LocalStore, calendars: &CalendarMap) -> Result<(), StoreError> {
    store.set(CALENDARS_KEY, &serde_json::to_value(calendars)?)
}

pub fn load_sets(store: &dyn LocalStore) -> Result<Vec<CalendarSet>, StoreError> {
    match store.get(SETS_KEY)? {
        Some(value) => {
            let sets: StoredSets = serde_json::from_value(value)?;
            Ok(sets.into_vec())
        }
        None => Ok(Vec::new()),
    }
}

pub fn save_sets(store: &dyn LocalStore, sets: &[CalendarSet]) -> Result<(), StoreError> {
    store.set(SETS_KEY, &serde_json::to_value(sets)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Calendar;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn create_test_calendar(id: &str, selected: bool) -> Calendar {
        Calendar {
            id: id.to_string(),
            summary: format!("Calendar {}", id),
            access_role: true,
            description: String::new(),
            foreground_color: "#000000".to_string(),
            background_color: "#ffffff".to_string(),
            color_id: "1".to_string(),
            selected,
        }
    }

    #[test]
    fn initialize_creates_schema_and_is_repeatable() {
        let store = SqliteStore::new(Connection::open_in_memory().unwrap());

        store.initialize().unwrap();
        store.initialize().unwrap();

        store.set("key", &json!(1)).unwrap();
        assert_eq!(store.get("key").unwrap(), Some(json!(1)));
    }

    #[test]
    fn open_creates_missing_parent_directories() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store.db");

        let store = SqliteStore::open(&path).unwrap();
        store.set("key", &json!("value")).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn open_reports_unusable_parent_directory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let result = SqliteStore::open(&blocker.join("store.db"));

        assert!(matches!(result, Err(StoreError::IoError(_))));
    }

    #[test]
    fn stores_value_under_key() {
        let store = create_test_store();

        store.set("answer", &json!({"value": 42})).unwrap();

        assert_eq!(store.get("answer").unwrap(), Some(json!({"value": 42})));
    }

    #[test]
    fn missing_key_returns_none() {
        let store = create_test_store();

        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn set_overwrites_existing_value() {
        let store = create_test_store();
        store.set("key", &json!("original")).unwrap();

        store.set("key", &json!("updated")).unwrap();

        assert_eq!(store.get("key").unwrap(), Some(json!("updated")));
    }

    #[test]
    fn load_calendars_defaults_to_empty_map() {
        let store = create_test_store();

        assert!(load_calendars(&store).unwrap().is_empty());
    }

    #[test]
    fn calendars_persist_as_object_keyed_by_id() {
        let store = create_test_store();
        let mut calendars = CalendarMap::new();
        calendars.insert("a".to_string(), create_test_calendar("a", true));
        calendars.insert("b".to_string(), create_test_calendar("b", false));

        save_calendars(&store, &calendars).unwrap();

        let raw = store.get(CALENDARS_KEY).unwrap().unwrap();
        assert_eq!(raw["a"]["selected"], true);
        assert_eq!(load_calendars(&store).unwrap(), calendars);
    }

    #[test]
    fn sets_persist_as_array() {
        let store = create_test_store();
        let sets = vec![CalendarSet::new("Work", vec!["a".to_string()])];

        save_sets(&store, &sets).unwrap();

        assert!(store.get(SETS_KEY).unwrap().unwrap().is_array());
        assert_eq!(load_sets(&store).unwrap(), sets);
    }

    #[test]
    fn corrupt_calendar_value_is_a_serialization_error() {
        let store = create_test_store();
        store.set(CALENDARS_KEY, &json!([1, 2, 3])).unwrap();

        let result = load_calendars(&store);

        assert!(matches!(result, Err(StoreError::SerializationError(_))));
    }
}
