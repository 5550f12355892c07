use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use log::{error, warn};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;

/// A single open-schema entry in a collection. By convention it carries a
/// numeric `id` plus store-managed `created_at`/`updated_at` timestamps,
/// but any field set is permitted.
pub type Record = Map<String, Value>;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A file-backed collection of records.
///
/// Each collection lives in one pretty-printed JSON file containing a
/// top-level array of objects. Every operation re-reads the file, performs
/// the query or mutation in memory, and on mutation writes the whole
/// collection back. Malformed file contents (missing, empty, corrupt, or
/// non-array JSON) are reset to an empty collection rather than surfaced as
/// errors; only genuine I/O failures propagate.
///
/// A per-store mutex guards the full load-mutate-save sequence, so
/// operations on the same `FileStore` never interleave.
pub struct FileStore {
    /// Path of the backing JSON file
    filepath: PathBuf,

    /// Serializes load-mutate-save sequences
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store for the collection `name`, backed by
    /// `<data_dir>/<name>.json`. Creates the data directory if needed.
    pub fn new(data_dir: impl AsRef<Path>, name: &str) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        Ok(Self {
            filepath: data_dir.join(format!("{}.json", name)),
            lock: Mutex::new(()),
        })
    }

    /// Path to the backing JSON file.
    pub fn path(&self) -> &Path {
        &self.filepath
    }

    /// Read the collection from disk, repairing malformed state.
    ///
    /// A healthy file is never rewritten by a load; the repair paths
    /// (missing file, blank file, corrupt or non-array JSON) persist an
    /// empty collection before returning it.
    async fn load(&self) -> StoreResult<Vec<Record>> {
        let content = match tokio::fs::read_to_string(&self.filepath).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let records = Vec::new();
                self.save(&records).await?;
                return Ok(records);
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            let records = Vec::new();
            self.save(&records).await?;
            return Ok(records);
        }

        let parsed: Value = match serde_json::from_str(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Invalid JSON in {:?}, resetting collection: {}", self.filepath, e);
                let records = Vec::new();
                self.save(&records).await?;
                return Ok(records);
            }
        };

        if !parsed.is_array() {
            warn!(
                "Expected a JSON array in {:?}, found {} instead; resetting collection",
                self.filepath,
                json_type_name(&parsed)
            );
            let records = Vec::new();
            self.save(&records).await?;
            return Ok(records);
        }

        match serde_json::from_value::<Vec<Record>>(parsed) {
            Ok(records) => Ok(records),
            Err(e) => {
                error!(
                    "Array in {:?} contains non-object entries, resetting collection: {}",
                    self.filepath, e
                );
                let records = Vec::new();
                self.save(&records).await?;
                Ok(records)
            }
        }
    }

    /// Write the collection to disk as pretty-printed JSON.
    ///
    /// Writes to a temporary file and renames it over the target, so a
    /// crash mid-write cannot leave a half-written collection behind.
    async fn save(&self, records: &[Record]) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(records)?;
        let temp_path = self.filepath.with_extension("tmp");

        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.filepath).await?;

        Ok(())
    }

    /// Get every record in the collection, in insertion order.
    pub async fn get_all(&self) -> StoreResult<Vec<Record>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Get the record whose `id` equals `id`, if any.
    pub async fn find_by_id(&self, id: i64) -> StoreResult<Option<Record>> {
        let _guard = self.lock.lock().await;
        let records = self.load().await?;

        Ok(records.into_iter().find(|r| record_id(r) == Some(id)))
    }

    /// Get the first record matching every field in `query`.
    ///
    /// The `email` field is compared case-insensitively when both the
    /// stored and queried values are strings; every other field requires
    /// exact equality.
    pub async fn find_one(&self, query: &Record) -> StoreResult<Option<Record>> {
        let _guard = self.lock.lock().await;
        let records = self.load().await?;

        Ok(records.into_iter().find(|r| matches_one(r, query)))
    }

    /// Get all records matching every field in `query` by exact equality.
    ///
    /// An empty query returns the whole collection. Unlike
    /// [`find_one`](Self::find_one), `email` gets no case folding here;
    /// the asymmetry is inherited behavior that callers rely on.
    pub async fn find(&self, query: &Record) -> StoreResult<Vec<Record>> {
        let _guard = self.lock.lock().await;
        let records = self.load().await?;

        if query.is_empty() {
            return Ok(records);
        }

        Ok(records.into_iter().filter(|r| matches_exact(r, query)).collect())
    }

    /// Append a new record built from `fields` and persist the collection.
    ///
    /// The new record gets the caller-supplied `id` if one is present, else
    /// `max(existing numeric ids) + 1` (starting at 1, non-numeric ids
    /// counting as 0). `created_at` keeps a caller-supplied value,
    /// `updated_at` is always set to now. Returns the stored record.
    pub async fn create(&self, fields: Record) -> StoreResult<Record> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;

        let max_id = records
            .iter()
            .map(|r| record_id(r).unwrap_or(0))
            .max()
            .unwrap_or(0);

        let mut record = fields;
        let id = match record.get("id").and_then(Value::as_i64) {
            Some(id) if id != 0 => id,
            _ => max_id + 1,
        };
        record.insert("id".to_string(), Value::from(id));

        let now = timestamp_now();
        let keep_created_at = matches!(record.get("created_at"), Some(Value::String(s)) if !s.is_empty());
        if !keep_created_at {
            record.insert("created_at".to_string(), Value::String(now.clone()));
        }
        record.insert("updated_at".to_string(), Value::String(now));

        records.push(record.clone());
        self.save(&records).await?;

        Ok(record)
    }

    /// Merge `updates` into the record with the given id and persist.
    ///
    /// Returns `None` without touching the file when the id is absent. The
    /// record's `id` can never be changed by an update, even if `updates`
    /// carries one; `updated_at` is refreshed on every successful update.
    pub async fn update(&self, id: i64, updates: Record) -> StoreResult<Option<Record>> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;

        let index = match records.iter().position(|r| record_id(r) == Some(id)) {
            Some(index) => index,
            None => return Ok(None),
        };

        let original_id = records[index].get("id").cloned().unwrap_or(Value::from(id));
        let record = &mut records[index];

        for (key, value) in updates {
            record.insert(key, value);
        }
        record.insert("id".to_string(), original_id);
        record.insert("updated_at".to_string(), Value::String(timestamp_now()));

        let updated = record.clone();
        self.save(&records).await?;

        Ok(Some(updated))
    }

    /// Remove the record with the given id and persist.
    ///
    /// Returns `false` without touching the file when the id is absent.
    pub async fn delete(&self, id: i64) -> StoreResult<bool> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;

        let index = match records.iter().position(|r| record_id(r) == Some(id)) {
            Some(index) => index,
            None => return Ok(false),
        };

        records.remove(index);
        self.save(&records).await?;

        Ok(true)
    }

    /// Number of records matching `query` (all records for an empty query).
    pub async fn count(&self, query: &Record) -> StoreResult<usize> {
        Ok(self.find(query).await?.len())
    }
}

/// Canonical numeric id of a record, if it has one.
fn record_id(record: &Record) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}

/// Current time as an ISO-8601 UTC string with millisecond precision.
fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Exact-equality match of every query field.
fn matches_exact(record: &Record, query: &Record) -> bool {
    query.iter().all(|(key, value)| record.get(key) == Some(value))
}

/// Match for `find_one`: `email` compares case-insensitively when both
/// sides are strings, everything else exactly.
fn matches_one(record: &Record, query: &Record) -> bool {
    query.iter().all(|(key, value)| {
        if key == "email" {
            if let (Some(stored), Some(queried)) =
                (record.get(key).and_then(Value::as_str), value.as_str())
            {
                return stored.to_lowercase() == queried.to_lowercase();
            }
        }
        record.get(key) == Some(value)
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(value: Value) -> Record {
        value.as_object().expect("test value must be an object").clone()
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        let first = store.create(record(json!({"title": "A"}))).await?;
        let second = store.create(record(json!({"title": "B"}))).await?;

        assert_eq!(first.get("id"), Some(&json!(1)));
        assert_eq!(second.get("id"), Some(&json!(2)));

        let all = store.get_all().await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].get("title"), Some(&json!("A")));
        assert_eq!(all[1].get("title"), Some(&json!("B")));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_skips_id_gaps() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        store.create(record(json!({"id": 1, "title": "A"}))).await?;
        store.create(record(json!({"id": 3, "title": "B"}))).await?;

        let next = store.create(record(json!({"title": "C"}))).await?;
        assert_eq!(next.get("id"), Some(&json!(4)));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_then_find_by_id() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        let created = store
            .create(record(json!({"title": "Hello", "draft": true})))
            .await?;
        let id = created.get("id").and_then(Value::as_i64).unwrap();

        let found = store.find_by_id(id).await?.expect("record should exist");
        assert_eq!(found, created);

        assert!(store.find_by_id(999).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_heals_to_empty_array() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        assert!(!store.path().exists());
        assert!(store.get_all().await?.is_empty());

        let content = std::fs::read_to_string(store.path())?;
        assert_eq!(content, "[]");

        Ok(())
    }

    #[tokio::test]
    async fn test_whitespace_file_heals_to_empty_array() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        std::fs::write(store.path(), "   ")?;
        assert!(store.get_all().await?.is_empty());
        assert_eq!(std::fs::read_to_string(store.path())?, "[]");

        Ok(())
    }

    #[tokio::test]
    async fn test_non_array_json_heals_to_empty_array() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        std::fs::write(store.path(), r#"{"a":1}"#)?;
        assert!(store.get_all().await?.is_empty());
        assert_eq!(std::fs::read_to_string(store.path())?, "[]");

        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_json_heals_to_empty_array() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        std::fs::write(store.path(), "not json at all {{{")?;
        assert!(store.get_all().await?.is_empty());
        assert_eq!(std::fs::read_to_string(store.path())?, "[]");

        Ok(())
    }

    #[tokio::test]
    async fn test_find_one_email_is_case_insensitive() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "users")?;

        store
            .create(record(json!({"email": "user@example.com", "role": "user"})))
            .await?;

        let found = store
            .find_one(&record(json!({"email": "User@Example.com"})))
            .await?;
        assert!(found.is_some());

        // The plural form stays strictly case-sensitive.
        let found = store
            .find(&record(json!({"email": "User@Example.com"})))
            .await?;
        assert!(found.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_find_with_empty_query_returns_everything() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        store.create(record(json!({"title": "A", "published": true}))).await?;
        store.create(record(json!({"title": "B", "published": false}))).await?;

        assert_eq!(store.find(&Record::new()).await?.len(), 2);
        assert_eq!(
            store.find(&record(json!({"published": true}))).await?.len(),
            1
        );
        assert_eq!(store.count(&record(json!({"published": false}))).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_update_merges_and_preserves_id() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        let created = store.create(record(json!({"title": "Old", "views": 3}))).await?;
        let id = created.get("id").and_then(Value::as_i64).unwrap();

        let updated = store
            .update(id, record(json!({"title": "New", "id": 42})))
            .await?
            .expect("record should exist");

        assert_eq!(updated.get("id"), Some(&json!(id)));
        assert_eq!(updated.get("title"), Some(&json!("New")));
        assert_eq!(updated.get("views"), Some(&json!(3)));

        Ok(())
    }

    #[tokio::test]
    async fn test_update_with_empty_fields_refreshes_updated_at() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        let created = store.create(record(json!({"title": "A"}))).await?;
        let id = created.get("id").and_then(Value::as_i64).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let updated = store.update(id, Record::new()).await?.unwrap();

        assert_eq!(updated.get("title"), created.get("title"));
        assert_eq!(updated.get("created_at"), created.get("created_at"));
        assert_ne!(updated.get("updated_at"), created.get("updated_at"));

        Ok(())
    }

    #[tokio::test]
    async fn test_missed_update_and_delete_leave_file_untouched() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        store.create(record(json!({"title": "A"}))).await?;
        let before = std::fs::read_to_string(store.path())?;

        assert!(store.update(999, record(json!({"title": "X"}))).await?.is_none());
        assert!(!store.delete(999).await?);

        let after = std::fs::read_to_string(store.path())?;
        assert_eq!(before, after);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_removes_record() -> StoreResult<()> {
        let temp_dir = tempdir()?;
        let store = FileStore::new(temp_dir.path(), "articles")?;

        let created = store.create(record(json!({"title": "A"}))).await?;
        let id = created.get("id").and_then(Value::as_i64).unwrap();

        assert!(store.delete(id).await?);
        assert!(store.find_by_id(id).await?.is_none());
        assert!(store.get_all().await?.is_empty());

        Ok(())
    }
}
