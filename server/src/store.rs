//! Persistence seams for user records and the cube snapshot
//!
//! The engine only needs atomic get/set on these records, so the stores are
//! small synchronous traits. In-memory implementations back tests and
//! throwaway servers; the file-backed ones keep progress across restarts.

use crate::error::StoreError;
use crate::leaderboard;
use crate::user::UserRecord;
use log::{debug, info};
use parking_lot::Mutex;
use shared::{CubeSnapshot, LeaderboardEntry};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub trait UserStore: Send + Sync {
    /// Loads a record, creating and persisting a default one on first sight.
    fn load_or_create(&self, id: &str) -> Result<UserRecord, StoreError>;

    fn save(&self, record: &UserRecord) -> Result<(), StoreError>;

    fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError>;
}

pub trait CubeStore: Send + Sync {
    fn load(&self) -> Result<Option<CubeSnapshot>, StoreError>;

    fn save(&self, snapshot: &CubeSnapshot) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryUserStore {
    records: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn load_or_create(&self, id: &str) -> Result<UserRecord, StoreError> {
        let mut records = self.records.lock();
        Ok(records
            .entry(id.to_string())
            .or_insert_with(|| UserRecord::new(id))
            .clone())
    }

    fn save(&self, record: &UserRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let records = self.records.lock();
        Ok(leaderboard::rank(records.values(), limit))
    }
}

#[derive(Default)]
pub struct MemoryCubeStore {
    snapshot: Mutex<Option<CubeSnapshot>>,
}

impl MemoryCubeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CubeStore for MemoryCubeStore {
    fn load(&self) -> Result<Option<CubeSnapshot>, StoreError> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, snapshot: &CubeSnapshot) -> Result<(), StoreError> {
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }
}

/// Writes through a sibling temp file so a crash never leaves a torn file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// All user records in one JSON document, rewritten on every save.
pub struct FileUserStore {
    path: PathBuf,
    records: Mutex<HashMap<String, UserRecord>>,
}

impl FileUserStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = if path.exists() {
            let text = fs::read_to_string(&path)?;
            let list: Vec<UserRecord> = serde_json::from_str(&text)?;
            list.into_iter()
                .map(|record| (record.id.clone(), record))
                .collect()
        } else {
            HashMap::new()
        };

        info!("Loaded {} user records from {}", records.len(), path.display());
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    fn persist(&self, records: &HashMap<String, UserRecord>) -> Result<(), StoreError> {
        let mut list: Vec<&UserRecord> = records.values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        let text = serde_json::to_string_pretty(&list)?;
        write_atomic(&self.path, text.as_bytes())
    }

    /// Inserts and persists, restoring the previous entry if the write fails.
    fn put(
        &self,
        records: &mut HashMap<String, UserRecord>,
        record: UserRecord,
    ) -> Result<(), StoreError> {
        let id = record.id.clone();
        let previous = records.insert(id.clone(), record);
        if let Err(e) = self.persist(records) {
            match previous {
                Some(previous) => records.insert(id, previous),
                None => records.remove(&id),
            };
            return Err(e);
        }
        Ok(())
    }
}

impl UserStore for FileUserStore {
    fn load_or_create(&self, id: &str) -> Result<UserRecord, StoreError> {
        let mut records = self.records.lock();
        if let Some(record) = records.get(id) {
            return Ok(record.clone());
        }

        let record = UserRecord::new(id);
        self.put(&mut records, record.clone())?;
        debug!("Created user record for {}", id);
        Ok(record)
    }

    fn save(&self, record: &UserRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        self.put(&mut records, record.clone())
    }

    fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let records = self.records.lock();
        Ok(leaderboard::rank(records.values(), limit))
    }
}

/// Cube snapshot as a bincode file.
pub struct FileCubeStore {
    path: PathBuf,
}

impl FileCubeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CubeStore for FileCubeStore {
    fn load(&self) -> Result<Option<CubeSnapshot>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        Ok(Some(bincode::deserialize(&bytes)?))
    }

    fn save(&self, snapshot: &CubeSnapshot) -> Result<(), StoreError> {
        let bytes = bincode::serialize(snapshot)?;
        write_atomic(&self.path, &bytes)
    }
}
