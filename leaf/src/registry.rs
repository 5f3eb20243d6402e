//! The leaf's local file registry: `file name -> FileInfo`, plus the per-replica `last_checked`
//! timestamp the pull-model consistency checker needs (§3, §4.5).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use common::FileInfo;

#[derive(Clone, Debug)]
struct Entry {
    info: FileInfo,
    last_checked: Option<Instant>,
}

/// Concurrent `file name -> FileInfo` map. Mutations are single-key; the filesystem watcher and
/// the CLI are the only writers for owned files, while downloads, invalidations, and status
/// probes write replica entries.
pub struct FileRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or overwrites the entry for `info.name`, clearing `last_checked` (a freshly
    /// written entry has not yet been probed).
    pub fn insert(&self, info: FileInfo) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            info.name.clone(),
            Entry {
                info,
                last_checked: None,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<FileInfo> {
        self.entries.read().unwrap().get(name).map(|e| e.info.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().unwrap().contains_key(name)
    }

    /// Removes the entry for `name`, returning it if present.
    pub fn remove(&self, name: &str) -> Option<FileInfo> {
        self.entries.write().unwrap().remove(name).map(|e| e.info)
    }

    /// Bumps the version of an owned entry in place, e.g. on a filesystem modify event.
    pub fn bump_version(&self, name: &str) -> Option<FileInfo> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries.get_mut(name)?;
        entry.info.version += 1;
        Some(entry.info.clone())
    }

    /// All `(name, FileInfo)` pairs not originated by `self_addr`, together with how long since
    /// their last successful status probe (`None` if never checked) — the consistency checker's
    /// per-tick worklist (§4.5).
    pub fn replicas_not_owned_by(&self, self_addr: &common::Address) -> Vec<(String, FileInfo, Option<Instant>)> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter(|(_, e)| !e.info.is_origin(self_addr))
            .map(|(name, e)| (name.clone(), e.info.clone(), e.last_checked))
            .collect()
    }

    pub fn set_last_checked(&self, name: &str, at: Instant) {
        if let Some(entry) = self.entries.write().unwrap().get_mut(name) {
            entry.last_checked = Some(at);
        }
    }

    pub fn clear_last_checked(&self, name: &str) {
        if let Some(entry) = self.entries.write().unwrap().get_mut(name) {
            entry.last_checked = None;
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}
