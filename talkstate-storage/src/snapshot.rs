//! Snapshot storage.
//!
//! One JSON file per talk plus an `index.json` recording each file's crc32c,
//! so a damaged file is caught on load instead of silently restoring a
//! wrong state.

use crate::error::StorageError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use talkstate_core::Talk;

/// Snapshot metadata kept in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub talk_id: String,
    pub version: u64,
    pub updated_at: i64,
    pub size_bytes: u64,
    pub checksum: String,
}

/// Snapshot store for persisting talk records.
pub struct SnapshotStore {
    dir: PathBuf,
    /// talk_id -> latest snapshot metadata.
    index: RwLock<HashMap<String, SnapshotMeta>>,
}

impl SnapshotStore {
    /// Opens or creates a snapshot store at the given directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let store = Self {
            dir,
            index: RwLock::new(HashMap::new()),
        };
        store.load_index()?;

        tracing::info!(
            "Opened snapshot store at {} ({} talks)",
            store.dir.display(),
            store.index.read().len()
        );

        Ok(store)
    }

    fn load_index(&self) -> Result<(), StorageError> {
        let index_path = self.dir.join("index.json");
        if !index_path.exists() {
            return Ok(());
        }

        let file = File::open(&index_path)?;
        let reader = BufReader::new(file);
        let index: HashMap<String, SnapshotMeta> = serde_json::from_reader(reader)?;
        *self.index.write() = index;

        Ok(())
    }

    fn save_index(&self, index: &HashMap<String, SnapshotMeta>) -> Result<(), StorageError> {
        let tmp_path = self.dir.join("index.json.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, index)?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, self.dir.join("index.json"))?;
        Ok(())
    }

    /// Writes `talk` and records it in the index.
    pub fn write_talk(&self, talk: &Talk) -> Result<SnapshotMeta, StorageError> {
        let path = self.talk_path(&talk.id)?;
        let data = serde_json::to_vec_pretty(talk)?;
        let checksum = format!("{:08x}", crc32c::crc32c(&data));

        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }

        let meta = SnapshotMeta {
            talk_id: talk.id.clone(),
            version: talk.version,
            updated_at: talk.updated_at,
            size_bytes: data.len() as u64,
            checksum,
        };

        // Index and file are swapped under the same lock so readers never
        // pair a new file with an old checksum. The previous file is kept
        // aside until the index is saved so a failed save can put it back.
        let mut index = self.index.write();
        let backup_path = path.with_extension("json.bak");
        let had_previous = path.exists();
        if had_previous {
            fs::rename(&path, &backup_path)?;
        }
        if let Err(e) = fs::rename(&tmp_path, &path) {
            self.restore_file(&path, &backup_path, had_previous);
            return Err(e.into());
        }

        let previous = index.insert(talk.id.clone(), meta.clone());
        if let Err(e) = self.save_index(&index) {
            match previous {
                Some(prev) => index.insert(talk.id.clone(), prev),
                None => index.remove(&talk.id),
            };
            self.restore_file(&path, &backup_path, had_previous);
            return Err(e);
        }
        drop(index);

        if had_previous {
            if let Err(e) = fs::remove_file(&backup_path) {
                tracing::warn!("Failed to remove {}: {}", backup_path.display(), e);
            }
        }

        tracing::debug!(
            "Wrote snapshot for talk {} at version {}",
            talk.id,
            talk.version
        );

        Ok(meta)
    }

    /// Puts the pre-write file back after a failed swap.
    fn restore_file(&self, path: &Path, backup_path: &Path, had_previous: bool) {
        let restored = if had_previous {
            fs::rename(backup_path, path)
        } else {
            match fs::remove_file(path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        };
        if let Err(e) = restored {
            tracing::error!("Failed to restore snapshot {}: {}", path.display(), e);
        }
    }

    /// Loads a talk, verifying its checksum.
    pub fn load_talk(&self, talk_id: &str) -> Result<Talk, StorageError> {
        let index = self.index.read();
        let meta = index
            .get(talk_id)
            .ok_or_else(|| StorageError::TalkNotFound(talk_id.to_string()))?;

        let path = self.talk_path(talk_id)?;
        let mut data = Vec::new();
        File::open(&path)?.read_to_end(&mut data)?;

        let actual = format!("{:08x}", crc32c::crc32c(&data));
        if actual != meta.checksum {
            return Err(StorageError::Corruption(format!(
                "talk {} checksum mismatch (expected {}, got {})",
                talk_id, meta.checksum, actual
            )));
        }
        drop(index);

        Ok(serde_json::from_slice(&data)?)
    }

    /// Loads every indexed talk.
    pub fn load_all(&self) -> Result<Vec<Talk>, StorageError> {
        let ids: Vec<String> = self.index.read().keys().cloned().collect();
        ids.iter().map(|id| self.load_talk(id)).collect()
    }

    pub fn get_meta(&self, talk_id: &str) -> Option<SnapshotMeta> {
        self.index.read().get(talk_id).cloned()
    }

    pub fn list(&self) -> Vec<SnapshotMeta> {
        self.index.read().values().cloned().collect()
    }

    fn talk_path(&self, talk_id: &str) -> Result<PathBuf, StorageError> {
        let valid = !talk_id.is_empty()
            && talk_id != "index"
            && talk_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidId(talk_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", talk_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talkstate_core::State;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_load() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let mut talk = Talk::new("t-1", "Async drop").with_abstract("what could go wrong");
        talk.state = State::Review;
        talk.version = 1;

        let meta = store.write_talk(&talk).unwrap();
        assert_eq!(meta.talk_id, "t-1");
        assert_eq!(meta.version, 1);

        let loaded = store.load_talk("t-1").unwrap();
        assert_eq!(loaded, talk);
    }

    #[test]
    fn test_reopen_keeps_index() {
        let dir = TempDir::new().unwrap();
        {
            let store = SnapshotStore::open(dir.path()).unwrap();
            store.write_talk(&Talk::new("t-1", "a")).unwrap();
            store.write_talk(&Talk::new("t-2", "b")).unwrap();
        }

        let store = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(store.list().len(), 2);
        let mut ids: Vec<String> = store.load_all().unwrap().into_iter().map(|t| t.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["t-1", "t-2"]);
    }

    #[test]
    fn test_overwrite_updates_meta() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let mut talk = Talk::new("t-1", "a");
        store.write_talk(&talk).unwrap();
        talk.state = State::Rejected;
        talk.version = 1;
        store.write_talk(&talk).unwrap();

        assert_eq!(store.get_meta("t-1").unwrap().version, 1);
        assert_eq!(store.load_talk("t-1").unwrap().state, State::Rejected);
    }

    #[test]
    fn test_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.write_talk(&Talk::new("t-1", "a")).unwrap();

        let path = dir.path().join("t-1.json");
        let tampered = fs::read_to_string(&path)
            .unwrap()
            .replace("\"new\"", "\"confirmed\"");
        fs::write(&path, tampered).unwrap();

        assert!(matches!(
            store.load_talk("t-1"),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_failed_index_save_restores_file() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let talk = Talk::new("t-1", "a");
        store.write_talk(&talk).unwrap();

        // Block the index temp path so the index save fails after the swap.
        fs::create_dir(dir.path().join("index.json.tmp")).unwrap();

        let mut next = talk.clone();
        next.state = State::Unconfirmed;
        next.version = 1;
        assert!(matches!(store.write_talk(&next), Err(StorageError::Io(_))));
        assert_eq!(store.get_meta("t-1").unwrap().version, 0);
        assert_eq!(store.load_talk("t-1").unwrap(), talk);

        // A brand new talk leaves no file behind either.
        assert!(store.write_talk(&Talk::new("t-2", "b")).is_err());
        assert!(!dir.path().join("t-2.json").exists());

        fs::remove_dir(dir.path().join("index.json.tmp")).unwrap();
        let reopened = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load_all().unwrap(), vec![talk]);
    }

    #[test]
    fn test_missing_talk() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load_talk("nope"),
            Err(StorageError::TalkNotFound(_))
        ));
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let result = store.write_talk(&Talk::new("../escape", "a"));
        assert!(matches!(result, Err(StorageError::InvalidId(_))));
        assert!(store.list().is_empty());
    }
}
