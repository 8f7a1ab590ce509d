//! Local cache index of staged series artifacts.
//!
//! Layout under the cache root:
//!
//! ```text
//! cache_index.json
//! BTCUSDT/BTC_15m.parquet
//! BTCUSDT/BTC_1h.parquet
//! ETHUSDT/...
//! ```
//!
//! The index maps `<instrument>_<resolution>` to a [`CacheEntry`] and is
//! rewritten through a temporary file and a rename after every change, so a
//! crash never leaves a half-written index behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use klinesync_core::{CacheEntry, CacheStats, CacheStatus, SeriesKey, SyncError};

/// File name of the index inside the cache root.
pub const INDEX_FILE: &str = "cache_index.json";

/// Explicit, file-backed index of staged artifacts.
#[derive(Debug)]
pub struct CacheIndex {
    root: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheIndex {
    /// Open (creating if needed) the cache at `root` and load its index.
    ///
    /// An unreadable or corrupt index is logged and replaced by an empty one.
    ///
    /// # Errors
    /// Returns `SyncError::Io` if the cache directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let entries = load_entries(&root.join(INDEX_FILE));
        Ok(Self { root, entries })
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the index file.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// Number of tracked entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for `key`, if staged.
    #[must_use]
    pub fn get(&self, key: &SeriesKey) -> Option<&CacheEntry> {
        self.entries.get(&key.cache_key())
    }

    /// All entries in index order.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Pending entries in index order.
    #[must_use]
    pub fn pending(&self) -> Vec<CacheEntry> {
        self.entries
            .values()
            .filter(|e| e.is_pending())
            .cloned()
            .collect()
    }

    /// Persist the index atomically.
    ///
    /// # Errors
    /// Returns `SyncError::Io` on write failures.
    pub fn save(&self) -> Result<(), SyncError> {
        let json = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| SyncError::Data(format!("cache index encode: {e}")))?;
        let path = self.index_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Where the artifact of `key` lives under the cache root.
    #[must_use]
    pub fn artifact_path(&self, key: &SeriesKey) -> PathBuf {
        self.root
            .join(key.instrument.as_str())
            .join(key.file_name())
    }

    /// Write `artifact` for `key` and record it as pending, replacing any
    /// previous entry for the same pair.
    ///
    /// A newly written file is removed again if the index cannot be saved.
    ///
    /// # Errors
    /// Returns `SyncError::Io` if the artifact or the index cannot be written.
    pub fn stage(
        &mut self,
        key: &SeriesKey,
        rows: usize,
        artifact: &[u8],
    ) -> Result<CacheEntry, SyncError> {
        let filepath = self.artifact_path(key);
        if let Some(dir) = filepath.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&filepath, artifact)?;
        self.record(key, rows).inspect_err(|_| {
            if self.get(key).is_none() {
                let _ = remove_if_exists(&filepath);
            }
        })
    }

    /// Record an artifact already written to [`CacheIndex::artifact_path`]
    /// as pending.
    ///
    /// The index is left exactly as it was when the save fails.
    ///
    /// # Errors
    /// Returns `SyncError::Io` if the index cannot be saved.
    pub fn record(&mut self, key: &SeriesKey, rows: usize) -> Result<CacheEntry, SyncError> {
        let filepath = self.artifact_path(key);
        let entry = CacheEntry {
            filename: key.file_name(),
            instrument: key.instrument.clone(),
            resolution: key.resolution,
            rows,
            status: CacheStatus::Pending,
            filepath,
        };
        let cache_key = key.cache_key();
        let previous = self.entries.insert(cache_key.clone(), entry.clone());
        if let Err(err) = self.save() {
            match previous {
                Some(prev) => self.entries.insert(cache_key, prev),
                None => self.entries.remove(&cache_key),
            };
            return Err(err);
        }
        Ok(entry)
    }

    /// Record a confirmed upload.
    ///
    /// The entry stays pending when the index cannot be saved.
    ///
    /// # Errors
    /// Returns `SyncError::NotFound` for an unknown key and `SyncError::Io`
    /// if the index cannot be saved.
    pub fn mark_uploaded(&mut self, key: &SeriesKey) -> Result<(), SyncError> {
        let entry = self
            .entries
            .get_mut(&key.cache_key())
            .ok_or_else(|| SyncError::not_found(format!("cache entry {key}")))?;
        let previous = std::mem::replace(&mut entry.status, CacheStatus::Uploaded);
        self.save().inspect_err(|_| {
            if let Some(entry) = self.entries.get_mut(&key.cache_key()) {
                entry.status = previous;
            }
        })
    }

    /// Delete the local artifact of an uploaded entry, keeping its index record.
    ///
    /// Pending entries are left alone.
    ///
    /// # Errors
    /// Returns `SyncError::Io` if the file exists but cannot be removed.
    pub fn remove_artifact(&self, key: &SeriesKey) -> Result<(), SyncError> {
        match self.get(key) {
            Some(entry) if !entry.is_pending() => remove_if_exists(&entry.filepath),
            _ => Ok(()),
        }
    }

    /// Remove every uploaded entry: its file, its index record, and any
    /// per-instrument directory left empty. Returns how many entries went.
    ///
    /// # Errors
    /// Returns `SyncError::Io` on filesystem failures.
    pub fn cleanup_uploaded(&mut self) -> Result<usize, SyncError> {
        let uploaded: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.is_pending())
            .map(|(k, _)| k.clone())
            .collect();
        let mut removed = Vec::with_capacity(uploaded.len());
        for cache_key in uploaded {
            if let Some(entry) = self.entries.remove(&cache_key) {
                let gone = remove_if_exists(&entry.filepath).and_then(|()| {
                    entry
                        .filepath
                        .parent()
                        .map_or(Ok(()), |dir| remove_dir_if_empty(dir, &self.root))
                });
                removed.push((cache_key, entry));
                if let Err(err) = gone {
                    self.restore(removed);
                    return Err(err);
                }
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }
        if let Err(err) = self.save() {
            self.restore(removed);
            return Err(err);
        }
        Ok(removed.len())
    }

    fn restore(&mut self, removed: Vec<(String, CacheEntry)>) {
        self.entries.extend(removed);
    }

    /// Aggregate counts over the index. Missing files count as zero bytes.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.entries
            .values()
            .fold(CacheStats::default(), |mut acc, e| {
                if e.is_pending() {
                    acc.pending += 1;
                    acc.pending_rows += e.rows;
                    acc.pending_bytes += fs::metadata(&e.filepath).map_or(0, |m| m.len());
                } else {
                    acc.uploaded += 1;
                }
                acc
            })
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, CacheEntry> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return BTreeMap::new(),
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(path = %path.display(), error = %_e, "cache index unreadable, starting empty");
            return BTreeMap::new();
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(entries) => entries,
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(path = %path.display(), error = %_e, "cache index corrupt, starting empty");
            BTreeMap::new()
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<(), SyncError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

fn remove_dir_if_empty(dir: &Path, root: &Path) -> Result<(), SyncError> {
    if dir == root || !dir.starts_with(root) {
        return Ok(());
    }
    let is_empty = match fs::read_dir(dir) {
        Ok(mut it) => it.next().is_none(),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if is_empty {
        fs::remove_dir(dir)?;
    }
    Ok(())
}
