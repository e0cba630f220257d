//! # Local durable key-value store
//!
//! One file per key under the worker's data directory. Writes land first in
//! a `.tmp/` subdirectory and are renamed into place, the same atomicity
//! discipline the ancestor codebase used for its checkpoint files — a crash
//! mid-write leaves either the previous file or the new one, never a
//! half-written one. Staging files live in their own subdirectory rather
//! than alongside the final files so a key that happens to end in `.tmp`
//! can never be mistaken for a leftover temp file on restart.
//!
//! Reads are served from an in-memory mapping kept in sync with disk; a
//! per-key lock table serializes concurrent writers on the same key so the
//! file and the map can never diverge.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::KvError;

#[derive(Serialize, Deserialize)]
struct Envelope {
    value: String,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

fn key_path(data_dir: &Path, key: &str) -> PathBuf {
    data_dir.join(urlencoding::encode(key).into_owned())
}

fn tmp_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(".tmp")
}

fn tmp_path(data_dir: &Path, key: &str) -> PathBuf {
    tmp_dir(data_dir).join(urlencoding::encode(key).into_owned())
}

/// A single worker's local store: an in-memory mapping mirrored to disk,
/// with a per-key async lock table guarding read-modify-write sequences.
pub struct Store {
    data_dir: PathBuf,
    entries: Mutex<HashMap<String, String>>,
    key_locks: Mutex<HashMap<String, std::sync::Arc<AsyncMutex<()>>>>,
}

impl Store {
    /// Opens (creating if absent) the data directory and loads every
    /// artifact found there into memory.
    pub fn open(data_dir: PathBuf) -> Result<Self, KvError> {
        fs::create_dir_all(&data_dir).map_err(|e| KvError::StorageFailure(e.to_string()))?;
        fs::create_dir_all(tmp_dir(&data_dir)).map_err(|e| KvError::StorageFailure(e.to_string()))?;

        let mut entries = HashMap::new();
        for entry in fs::read_dir(&data_dir).map_err(|e| KvError::StorageFailure(e.to_string()))? {
            let entry = entry.map_err(|e| KvError::StorageFailure(e.to_string()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let filename = match path.file_name().and_then(|f| f.to_str()) {
                Some(f) => f,
                None => continue,
            };
            let key = urlencoding::decode(filename)
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| filename.to_string());
            if let Ok(raw) = fs::read_to_string(&path) {
                if let Ok(env) = serde_json::from_str::<Envelope>(&raw) {
                    entries.insert(key, env.value);
                }
            }
        }

        Ok(Store {
            data_dir,
            entries: Mutex::new(entries),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    fn lock_for(&self, key: &str) -> std::sync::Arc<AsyncMutex<()>> {
        let mut locks = lock_or_recover(&self.key_locks);
        locks
            .entry(key.to_string())
            .or_insert_with(|| std::sync::Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        lock_or_recover(&self.entries).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock_or_recover(&self.entries).keys().cloned().collect()
    }

    /// Durably writes `value` for `key`: serializes concurrent writers on
    /// this key, writes the new file to a temp path, fsyncs, renames over
    /// the target, then updates the in-memory mapping.
    pub async fn put(&self, key: &str, value: &str) -> Result<(), KvError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let path = key_path(&self.data_dir, key);
        let tmp = tmp_path(&self.data_dir, key);
        let envelope = Envelope {
            value: value.to_string(),
        };
        let data_dir = self.data_dir.clone();
        let value_owned = value.to_string();

        tokio::task::spawn_blocking(move || write_atomic(&tmp, &path, &envelope, &data_dir))
            .await
            .map_err(|e| KvError::StorageFailure(e.to_string()))??;

        lock_or_recover(&self.entries).insert(key.to_string(), value_owned);
        Ok(())
    }
}

fn write_atomic(
    tmp_path: &Path,
    path: &Path,
    envelope: &Envelope,
    data_dir: &Path,
) -> Result<(), KvError> {
    let serialized =
        serde_json::to_string(envelope).map_err(|e| KvError::StorageFailure(e.to_string()))?;

    let file = fs::File::create(tmp_path).map_err(|e| KvError::StorageFailure(e.to_string()))?;
    {
        use std::io::Write;
        let mut file = &file;
        file.write_all(serialized.as_bytes())
            .map_err(|e| KvError::StorageFailure(e.to_string()))?;
        file.sync_all().map_err(|e| KvError::StorageFailure(e.to_string()))?;
    }
    fs::rename(tmp_path, path).map_err(|e| KvError::StorageFailure(e.to_string()))?;

    if let Ok(dir) = fs::File::open(data_dir) {
        let _ = dir.sync_all();
    }
    Ok(())
}
