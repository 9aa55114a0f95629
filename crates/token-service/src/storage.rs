//! Record store for OAuth clients, authorization requests, and refresh tokens
//!
//! [`RecordStore`] is the narrow interface the token endpoint consumes. It is
//! untyped (records travel as JSON values) so it stays object-safe; the typed
//! helpers on `dyn RecordStore` do the (de)serialization.
//!
//! [`LocalStore`] keeps records in memory and optionally persists them to
//! `records.json` after every mutation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::records::{Record, RecordKey, RecordKind};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: RecordKind, key: RecordKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: RecordKind, key: RecordKey },

    #[error("Field {field} is not indexed for {kind}")]
    NotIndexed { kind: RecordKind, field: String },

    #[error("Invalid record: {0}")]
    Invalid(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Named-record storage shared by every OAuth record kind.
///
/// Implementations must linearize `create`/`get`/`delete` per key: the
/// single-use guarantees of codes and refresh tokens rest on `delete`
/// reporting `NotFound` to every caller but one.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record by key
    async fn get(&self, kind: RecordKind, key: &RecordKey) -> Result<Value>;

    /// Store a new record. Fails with `AlreadyExists` if the key is taken.
    async fn create(&self, kind: RecordKind, record: Value) -> Result<()>;

    /// Remove a record. Fails with `NotFound` if it is already gone.
    async fn delete(&self, kind: RecordKind, key: &RecordKey) -> Result<()>;

    /// List records in `namespace` whose indexed `field` equals `value`
    async fn list_by_field(
        &self,
        kind: RecordKind,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>>;
}

impl dyn RecordStore {
    pub async fn get_record<R: Record>(&self, key: &RecordKey) -> Result<R> {
        let value = self.get(R::KIND, key).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn create_record<R: Record>(&self, record: &R) -> Result<()> {
        self.create(R::KIND, serde_json::to_value(record)?).await
    }

    pub async fn delete_record<R: Record>(&self, record: &R) -> Result<()> {
        self.delete(R::KIND, &record.key()).await
    }

    pub async fn list_records_by_field<R: Record>(
        &self,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<R>> {
        self.list_by_field(R::KIND, namespace, field, value)
            .await?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }
}

/// Secondary index entry: (kind, field, field value)
type IndexKey = (RecordKind, &'static str, String);

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<RecordKind, BTreeMap<RecordKey, Value>>,
    index: HashMap<IndexKey, BTreeSet<RecordKey>>,
}

impl StoreState {
    fn insert(&mut self, kind: RecordKind, key: RecordKey, record: Value) -> Result<()> {
        let records = self.records.entry(kind).or_default();
        if records.contains_key(&key) {
            return Err(StoreError::AlreadyExists { kind, key });
        }
        for field in kind.indexed_fields() {
            if let Some(value) = record.get(*field).and_then(Value::as_str) {
                self.index
                    .entry((kind, *field, value.to_string()))
                    .or_default()
                    .insert(key.clone());
            }
        }
        records.insert(key, record);
        Ok(())
    }

    fn remove(&mut self, kind: RecordKind, key: &RecordKey) -> Result<Value> {
        let record = self
            .records
            .get_mut(&kind)
            .and_then(|records| records.remove(key))
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })?;
        for field in kind.indexed_fields() {
            if let Some(value) = record.get(*field).and_then(Value::as_str) {
                let index_key = (kind, *field, value.to_string());
                if let Some(keys) = self.index.get_mut(&index_key) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.index.remove(&index_key);
                    }
                }
            }
        }
        Ok(record)
    }

    fn snapshot(&self) -> BTreeMap<RecordKind, Vec<&Value>> {
        self.records
            .iter()
            .map(|(kind, records)| (*kind, records.values().collect()))
            .collect()
    }
}

/// In-memory record store with optional JSON persistence
pub struct LocalStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl LocalStore {
    /// A store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Open (or create) a store persisted as `records.json` in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join("records.json");

        let mut state = StoreState::default();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let snapshot: BTreeMap<RecordKind, Vec<Value>> = serde_json::from_str(&content)?;
            for (kind, records) in snapshot {
                for record in records {
                    let key = record_key(&record)?;
                    state.insert(kind, key, record)?;
                }
            }
            tracing::info!(
                "Loaded {} records from {:?}",
                state.records.values().map(BTreeMap::len).sum::<usize>(),
                path
            );
        }

        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    fn save(&self, state: &StoreState) -> Result<()> {
        if let Some(path) = &self.path {
            let content = serde_json::to_string_pretty(&state.snapshot())?;
            std::fs::write(path, content)?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    async fn get(&self, kind: RecordKind, key: &RecordKey) -> Result<Value> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        state
            .records
            .get(&kind)
            .and_then(|records| records.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })
    }

    async fn create(&self, kind: RecordKind, record: Value) -> Result<()> {
        let key = record_key(&record)?;
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        state.insert(kind, key.clone(), record)?;
        if let Err(e) = self.save(&state) {
            // Not durable, so not created
            state.remove(kind, &key)?;
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, kind: RecordKind, key: &RecordKey) -> Result<()> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let record = state.remove(kind, key)?;
        if let Err(e) = self.save(&state) {
            state.insert(kind, key.clone(), record)?;
            return Err(e);
        }
        Ok(())
    }

    async fn list_by_field(
        &self,
        kind: RecordKind,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>> {
        let Some(field) = kind.indexed_fields().iter().find(|f| **f == field) else {
            return Err(StoreError::NotIndexed {
                kind,
                field: field.to_string(),
            });
        };

        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        let Some(keys) = state.index.get(&(kind, *field, value.to_string())) else {
            return Ok(Vec::new());
        };
        let records = state.records.get(&kind);
        Ok(keys
            .iter()
            .filter(|key| key.namespace == namespace)
            .filter_map(|key| records.and_then(|r| r.get(key)).cloned())
            .collect())
    }
}

fn record_key(record: &Value) -> Result<RecordKey> {
    let field = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Invalid(format!("record has no {}", name)))
    };
    Ok(RecordKey::new(field("namespace")?, field("name")?))
}

// --- Utility Functions ---

/// Generate a refresh token: 256 bits from the thread-local CSPRNG, lowercase hex
pub fn generate_refresh_token() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Hash a token/code for storage (we don't store raw tokens)
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(token.as_bytes()))
}
