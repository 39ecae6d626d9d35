// src/pipeline/cache.rs
//! Snapshot cache keyed by `post_limit`, optionally mirrored to a JSON file.
//!
//! The file is rewritten atomically (tmp + rename) on every change; an
//! unreadable file is treated as an empty cache. Writes can be staged and run
//! off the lock (see [`SnapshotCache::stage`]).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::CacheEntry;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    entries: Vec<CacheEntry>,
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: Mutex<BTreeMap<usize, CacheEntry>>,
    store: Option<Arc<FileStore>>,
}

/// Backing file plus write ordering. Every change takes the next generation
/// under the entries lock; a write older than the last one on disk is dropped.
#[derive(Debug)]
struct FileStore {
    path: PathBuf,
    next: AtomicU64,
    written: Mutex<u64>,
}

impl FileStore {
    fn written(&self) -> MutexGuard<'_, u64> {
        self.written.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A snapshot of the cache waiting to be written to disk. Blocking; run it on
/// a blocking thread from async code.
#[must_use = "the cache file is only updated when the write is run"]
#[derive(Debug)]
pub struct PendingWrite {
    store: Arc<FileStore>,
    generation: u64,
    file: CacheFile,
}

impl PendingWrite {
    pub fn write(self) {
        let mut last = self.store.written();
        if self.generation <= *last {
            return;
        }
        let path = &self.store.path;
        match write_atomic(path, &self.file) {
            Ok(()) => *last = self.generation,
            Err(e) => {
                tracing::warn!(target: "cache", path = %path.display(), error = %e, "failed to persist cache")
            }
        }
    }
}

impl SnapshotCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Cache backed by `path`. Existing contents are loaded if they parse.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_file(&path);
        if !entries.is_empty() {
            tracing::info!(target: "cache", path = %path.display(), entries = entries.len(), "loaded persisted snapshots");
        }
        Self {
            entries: Mutex::new(entries),
            store: Some(Arc::new(FileStore {
                path,
                next: AtomicU64::new(0),
                written: Mutex::new(0),
            })),
        }
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_deref().map(|s| s.path.as_path())
    }

    fn guard(&self) -> MutexGuard<'_, BTreeMap<usize, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entry for `post_limit` whose age is at most `max_age` at `now`.
    pub fn fresh(&self, post_limit: usize, now: DateTime<Utc>, max_age: Duration) -> Option<CacheEntry> {
        self.guard()
            .get(&post_limit)
            .filter(|e| now - e.created_at <= max_age)
            .cloned()
    }

    /// Any entry regardless of age: the same key if present, else the newest.
    pub fn stale(&self, post_limit: usize) -> Option<CacheEntry> {
        let map = self.guard();
        map.get(&post_limit)
            .or_else(|| map.values().max_by_key(|e| e.created_at))
            .cloned()
    }

    pub fn newest(&self) -> Option<CacheEntry> {
        self.guard().values().max_by_key(|e| e.created_at).cloned()
    }

    pub fn keys(&self) -> Vec<usize> {
        self.guard().keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Replace the snapshot for `entry.post_limit` in memory. The returned
    /// write, if any, brings the file up to date; the lock is not held for it.
    pub fn stage(&self, entry: CacheEntry) -> Option<PendingWrite> {
        let mut map = self.guard();
        map.insert(entry.post_limit, entry);
        let store = self.store.as_ref()?;
        Some(PendingWrite {
            store: Arc::clone(store),
            generation: store.next.fetch_add(1, Ordering::SeqCst) + 1,
            file: CacheFile {
                entries: map.values().cloned().collect(),
            },
        })
    }

    /// Replace the snapshot for `entry.post_limit`, writing the file inline.
    pub fn replace(&self, entry: CacheEntry) {
        if let Some(w) = self.stage(entry) {
            w.write();
        }
    }

    pub fn clear(&self) {
        let mut map = self.guard();
        map.clear();
        let Some(store) = &self.store else {
            return;
        };
        let generation = store.next.fetch_add(1, Ordering::SeqCst) + 1;
        let mut last = store.written();
        if let Err(e) = fs::remove_file(&store.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(target: "cache", path = %store.path.display(), error = %e, "failed to remove cache file");
            }
        }
        *last = generation;
    }
}

fn load_file(path: &Path) -> BTreeMap<usize, CacheEntry> {
    let raw = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!(target: "cache", path = %path.display(), error = %e, "cache file unreadable, starting empty");
            return BTreeMap::new();
        }
    };
    match serde_json::from_str::<CacheFile>(&raw) {
        Ok(f) => f.entries.into_iter().map(|e| (e.post_limit, e)).collect(),
        Err(e) => {
            tracing::warn!(target: "cache", path = %path.display(), error = %e, "cache file corrupt, starting empty");
            BTreeMap::new()
        }
    }
}

fn write_atomic(path: &Path, file: &CacheFile) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(file)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
