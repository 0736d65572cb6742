//! # Storage Module - Persisted Identifier Sets
//!
//! smsrelay keeps exactly two pieces of durable state, both plain sets:
//!
//! - [`SeenStore`] - dedup keys of SMS messages already notified
//! - [`RecipientRegistry`] - chat ids allowed to receive notifications
//!
//! Each set is a JSON array on disk:
//!
//! ```text
//! data/
//! ├── seen_messages.json      ← ["SM_1_+1555..._24/01/01,12:00:00", ...]
//! └── authorized_users.json   ← [123456789, ...]
//! ```
//!
//! Every mutation is written through immediately: an exclusive `fs2` lock on a
//! sibling `.lock` file, then a temp-file rename. A failed write is logged and swallowed; the
//! in-memory set stays authoritative for the rest of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use smsrelay::storage::SeenStore;
//!
//! let mut seen = SeenStore::load("./data/seen_messages.json");
//! if !seen.contains(&"SM_1_+15551234567_".to_string()) {
//!     seen.insert("SM_1_+15551234567_".to_string());
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::hash::Hash;
use std::path::{Path, PathBuf};

/// Dedup keys of messages already delivered.
pub type SeenStore = PersistentSet<String>;
/// Notification destinations (Telegram chat ids).
pub type RecipientRegistry = PersistentSet<i64>;

/// A set mirrored to a JSON file on every change.
#[derive(Debug, Clone)]
pub struct PersistentSet<T> {
    path: PathBuf,
    items: HashSet<T>,
}

impl<T> PersistentSet<T>
where
    T: Eq + Hash + Clone + Ord + Serialize + DeserializeOwned,
{
    /// Load the set from `path`.
    ///
    /// A missing file is an empty set. An unreadable or corrupt file is logged
    /// and also treated as empty; it is overwritten on the next change.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<T>>(&content) {
                Ok(list) => list.into_iter().collect(),
                Err(e) => {
                    error!("Error loading {}: {}", path.display(), e);
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                error!("Error reading {}: {}", path.display(), e);
                HashSet::new()
            }
        };
        debug!("Loaded {} entries from {}", items.len(), path.display());
        Self { path, items }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Add `item`, persisting only if it was not already present.
    /// Returns whether the set changed.
    pub fn insert(&mut self, item: T) -> bool {
        let added = self.items.insert(item);
        if added {
            self.persist();
        }
        added
    }

    /// Remove everything and persist the empty set.
    pub fn clear(&mut self) {
        self.items.clear();
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot in ascending order.
    pub fn to_sorted_vec(&self) -> Vec<T> {
        let mut items: Vec<T> = self.items.iter().cloned().collect();
        items.sort();
        items
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!("Failed to persist {}: {:#}", self.path.display(), e);
        }
    }

    /// Write the whole set to disk.
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.to_sorted_vec())?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        write_file_locked(&self.path, &content)
    }
}

/// Sibling lock file serializing writers of `path`, e.g. `.seen_messages.json.lock`.
/// The data file itself is swapped by rename on every write and cannot hold the lock.
fn lock_path(path: &Path) -> PathBuf {
    let base = path.file_name().and_then(|s| s.to_str()).unwrap_or("set.json");
    path.with_file_name(format!(".{}.lock", base))
}

/// Replace `path` with `content` under an exclusive lock via temp file + rename.
fn write_file_locked(path: &Path, content: &str) -> Result<()> {
    use std::fs::{self, File, OpenOptions};
    use std::io::Write;

    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))?;
    lock_file.lock_exclusive()?;

    let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let base = path.file_name().and_then(|s| s.to_str()).unwrap_or("set.json");
    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut tmp) => {
                tmp.write_all(content.as_bytes())?;
                tmp.flush()?;
                let _ = tmp.sync_all();
                break candidate;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
            }
            Err(e) => return Err(anyhow!("Failed to create temp file for atomic write: {}", e)),
        }
    };

    fs::rename(&tmp_path, path)?;
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    let _ = lock_file.unlock();
    Ok(())
}
