//! Local persistence: a string key/value store and typed JSON slots over it.
//!
//! Two keys are used: `echo_history` (journal entries, newest first) and
//! `echo_settings`. Reads never fail; a missing or unreadable value loads
//! as the default.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{EchoError, Result};
use crate::logging;
use crate::models::{JournalEntry, Settings};

pub const HISTORY_KEY: &str = "echo_history";
pub const SETTINGS_KEY: &str = "echo_settings";
pub const DB_FILE_NAME: &str = "echo.db";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

// ============ In-memory ============

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values().remove(key);
        Ok(())
    }
}

// ============ SQLite ============

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories as needed
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        logging::log_storage(&format!("Opened {}", path.display()));
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| EchoError::Storage("database lock poisoned".to_string()))?;
        Ok(f(&*conn)?)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
            Ok(())
        })
    }
}

// ============ Typed slots ============

/// Whole-value persistence for one piece of shell state
pub trait StatePort<T>: Send + Sync {
    /// Stored value, or the default when absent or unreadable
    fn load(&self) -> T;
    fn save(&self, value: &T) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// A `T` stored as JSON under a fixed key
pub struct JsonSlot<T> {
    store: Arc<dyn KeyValueStore>,
    key: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSlot<T> {
    pub fn new(store: Arc<dyn KeyValueStore>, key: &'static str) -> Self {
        Self {
            store,
            key,
            _marker: PhantomData,
        }
    }
}

impl<T> JsonSlot<T> {
    fn read(&self) -> Option<String> {
        match self.store.get(self.key) {
            Ok(raw) => raw,
            Err(e) => {
                logging::log_storage(&format!("Read of {} failed, using default: {}", self.key, e));
                None
            }
        }
    }
}

impl<T> StatePort<T> for JsonSlot<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn load(&self) -> T {
        let Some(raw) = self.read() else {
            return T::default();
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            logging::log_storage(&format!("Stored {} is unreadable, using default: {}", self.key, e));
            T::default()
        })
    }

    fn save(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.store.set(self.key, &json)
    }

    fn clear(&self) -> Result<()> {
        self.store.remove(self.key)
    }
}

/// The journal array. Elements are read one by one so a single bad entry
/// does not cost the rest of the history.
pub struct HistorySlot(JsonSlot<Vec<JournalEntry>>);

impl StatePort<Vec<JournalEntry>> for HistorySlot {
    fn load(&self) -> Vec<JournalEntry> {
        let Some(raw) = self.0.read() else {
            return Vec::new();
        };

        let elements = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(elements)) => elements,
            Ok(_) => {
                logging::log_storage(&format!("Stored {} is not an array, using default", HISTORY_KEY));
                return Vec::new();
            }
            Err(e) => {
                logging::log_storage(&format!("Stored {} is unreadable, using default: {}", HISTORY_KEY, e));
                return Vec::new();
            }
        };

        elements
            .into_iter()
            .enumerate()
            .filter_map(|(index, element)| match serde_json::from_value(element) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    logging::log_storage(&format!("Skipping {}[{}]: {}", HISTORY_KEY, index, e));
                    None
                }
            })
            .collect()
    }

    fn save(&self, value: &Vec<JournalEntry>) -> Result<()> {
        self.0.save(value)
    }

    fn clear(&self) -> Result<()> {
        self.0.clear()
    }
}

pub fn history_port(store: Arc<dyn KeyValueStore>) -> HistorySlot {
    HistorySlot(JsonSlot::new(store, HISTORY_KEY))
}

pub fn settings_port(store: Arc<dyn KeyValueStore>) -> JsonSlot<Settings> {
    JsonSlot::new(store, SETTINGS_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Emotion, Message, Suggestion, SuggestionKind};
    use tempfile::TempDir;

    fn entry(id: i64) -> JournalEntry {
        JournalEntry {
            id,
            trigger: "最近压力好大".to_string(),
            emotion: Some(Emotion::Anxiety),
            suggestion: Suggestion {
                title: "最坏清单".to_string(),
                kind: SuggestionKind::Cognitive,
                desc: "写下来".to_string(),
                tag: "认知重构".to_string(),
            },
            date: "2024-05-29T16:26:40.000Z".to_string(),
            completed: id % 2 == 0,
            conversation: vec![Message::user("最近压力好大"), Message::assistant("我听到了")],
        }
    }

    #[test]
    fn test_missing_keys_load_defaults() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        assert!(history_port(store.clone()).load().is_empty());
        assert_eq!(settings_port(store).load(), Settings::default());
    }

    #[test]
    fn test_corrupt_values_load_defaults() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(HISTORY_KEY, "{not json").unwrap();
        store.set(SETTINGS_KEY, "[1,2,3]").unwrap();
        assert!(history_port(store.clone()).load().is_empty());
        assert_eq!(settings_port(store).load(), Settings::default());
    }

    #[test]
    fn test_wrong_shape_history_loads_empty() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(HISTORY_KEY, r#"{"entries":[]}"#).unwrap();
        assert!(history_port(store).load().is_empty());
    }

    #[test]
    fn test_history_keeps_readable_entries() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut no_emotion = serde_json::to_value(entry(3)).unwrap();
        no_emotion.as_object_mut().unwrap().remove("emotion");
        let stored = serde_json::json!([no_emotion, {"id": 2, "trigger": "broken"}, entry(1)]);
        store.set(HISTORY_KEY, &stored.to_string()).unwrap();

        let loaded = history_port(store).load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, 3);
        assert_eq!(loaded[0].emotion, None);
        assert_eq!(loaded[1], entry(1));
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(SETTINGS_KEY, r#"{"privacy":true}"#).unwrap();
        let settings = settings_port(store).load();
        assert!(settings.daily_call);
        assert!(settings.privacy);
    }

    #[test]
    fn test_clear_removes_key() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let port = history_port(store.clone());
        port.save(&vec![entry(1)]).unwrap();
        assert!(store.get(HISTORY_KEY).unwrap().is_some());

        port.clear().unwrap();
        assert!(store.get(HISTORY_KEY).unwrap().is_none());
        assert!(port.load().is_empty());
    }

    #[test]
    fn test_sqlite_upsert_and_remove() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("two".to_string()));

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        // removing an absent key is fine
        store.remove("k").unwrap();
    }

    #[test]
    fn test_sqlite_round_trip_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(DB_FILE_NAME);
        let entries = vec![entry(2), entry(1)];
        let settings = Settings {
            daily_call: false,
            privacy: true,
        };

        {
            let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&path).unwrap());
            history_port(store.clone()).save(&entries).unwrap();
            settings_port(store).save(&settings).unwrap();
        }

        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&path).unwrap());
        assert_eq!(history_port(store.clone()).load(), entries);
        assert_eq!(settings_port(store).load(), settings);
    }
}
