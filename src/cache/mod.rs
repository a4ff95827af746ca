//! Disk-backed memoization of reference-data lookups.
//!
//! Statuses, priorities, issue types and the like change rarely, so bridges
//! wrap their loaders in [`CacheStore::cached`]. Each call is stored as one JSON
//! file named after the loader and a fingerprint of its arguments. Entries
//! older than [`CACHE_TTL`] are treated as absent. Reads never fail: a missing,
//! corrupt, stale or foreign entry just means the loader runs again.

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

/// How long an entry stays live.
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Schema version of the entry envelope.
pub const CACHE_FORMAT: u32 = 1;

/// Separates arguments in the fingerprint input.
const ARG_SEPARATOR: &str = "\u{1f}";

/// Loader names shared by both bridges, so `clear_named` means the same
/// thing whatever protocol filled the cache.
pub mod loader {
    pub const FILTERS: &str = "filters";
    pub const PROJECTS: &str = "projects";
    pub const COMPONENTS: &str = "components";
    pub const VERSIONS: &str = "versions";
    pub const PRIORITIES: &str = "priorities";
    pub const ISSUE_TYPES: &str = "issue_types";
    pub const SUBTASK_TYPES: &str = "subtask_types";
    pub const STATUSES: &str = "statuses";
    pub const RESOLUTIONS: &str = "resolutions";

    /// Every loader name.
    pub const ALL: &[&str] = &[
        FILTERS,
        PROJECTS,
        COMPONENTS,
        VERSIONS,
        PRIORITIES,
        ISSUE_TYPES,
        SUBTASK_TYPES,
        STATUSES,
        RESOLUTIONS,
    ];

    pub fn is_known(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// A stored cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Envelope schema version.
    pub format: u32,
    /// Name of the memoized loader.
    pub name: String,
    /// When the entry was written (Unix timestamp, seconds).
    pub cached_at: u64,
    /// The memoized value.
    pub data: Value,
}

impl CacheEntry {
    fn new(name: &str, data: Value) -> Self {
        Self {
            format: CACHE_FORMAT,
            name: name.to_string(),
            cached_at: now_secs(),
            data,
        }
    }

    /// Age of the entry.
    pub fn age(&self) -> Duration {
        Duration::from_secs(now_secs().saturating_sub(self.cached_at))
    }
}

/// File-per-entry cache store.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory holding the entries; `None` disables caching.
    dir: Option<PathBuf>,
    ttl: Duration,
}

impl CacheStore {
    /// The store in the platform cache directory (`~/.cache/jiracli` on Linux).
    ///
    /// Falls back to a disabled store when the platform has no cache directory.
    pub fn new() -> Self {
        match dirs::cache_dir() {
            Some(base) => Self::at(base.join("jiracli")),
            None => {
                warn!("No cache directory available, caching disabled");
                Self::disabled()
            }
        }
    }

    /// A store rooted at `dir`.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ttl: CACHE_TTL,
        }
    }

    /// A store that never keeps anything.
    pub fn disabled() -> Self {
        Self {
            dir: None,
            ttl: CACHE_TTL,
        }
    }

    /// The cache directory, if caching is enabled.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Return the live entry for `name` and `args`, or run `compute` and store its result.
    ///
    /// Errors from `compute` are passed through and nothing is stored. Write
    /// failures are logged and do not affect the returned value.
    pub async fn cached<T, E, F, Fut>(&self, name: &str, args: &[&str], compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(path) = self.entry_path(name, args) else {
            return compute().await;
        };

        if let Some(data) = self.read(&path) {
            match serde_json::from_value::<T>(data) {
                Ok(value) => {
                    trace!("Cache hit for {}", name);
                    return Ok(value);
                }
                Err(e) => debug!("Cached {} has an unexpected shape: {}", name, e),
            }
        }

        let value = compute().await?;
        match serde_json::to_value(&value) {
            Ok(data) => {
                if let Err(e) = write_entry(&path, &CacheEntry::new(name, data)) {
                    warn!("Failed to write cache entry {:?}: {}", path, e);
                }
            }
            Err(e) => warn!("Failed to serialize {} for the cache: {}", name, e),
        }
        Ok(value)
    }

    /// Remove the entry for one call, if present.
    pub fn invalidate(&self, name: &str, args: &[&str]) -> io::Result<()> {
        if let Some(path) = self.entry_path(name, args) {
            if path.exists() {
                fs::remove_file(&path)?;
                debug!("Invalidated cache entry {:?}", path);
            }
        }
        Ok(())
    }

    /// Remove every entry.
    pub fn clear(&self) -> io::Result<()> {
        if let Some(dir) = &self.dir {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
                debug!("Cleared cache directory {:?}", dir);
            }
        }
        Ok(())
    }

    /// Remove every entry of the given loader names. Returns how many were removed.
    pub fn clear_named(&self, names: &[&str]) -> io::Result<usize> {
        let mut removed = 0;
        for path in self.entry_files() {
            let matches = entry_name(&path).is_some_and(|n| names.contains(&n));
            if matches {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        debug!("Removed {} cache entries for {:?}", removed, names);
        Ok(removed)
    }

    /// Number of entry files currently on disk.
    pub fn len(&self) -> usize {
        self.entry_files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry_path(&self, name: &str, args: &[&str]) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}-{}.json", name, fingerprint(args))))
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        let Some(dir) = &self.dir else {
            return Vec::new();
        };
        walkdir::WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }

    /// Read a live entry, removing it when it is stale or unreadable.
    fn read(&self, path: &Path) -> Option<Value> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!("Failed to read cache file {:?}: {}", path, e);
                }
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Failed to parse cache entry {:?}: {}", path, e);
                let _ = fs::remove_file(path);
                return None;
            }
        };

        if entry.format != CACHE_FORMAT || entry.age() >= self.ttl {
            trace!("Cache entry {:?} is stale", path);
            let _ = fs::remove_file(path);
            return None;
        }

        Some(entry.data)
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex SHA-256 of the arguments joined with a unit separator.
pub fn fingerprint(args: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(args.join(ARG_SEPARATOR).as_bytes());
    hex::encode(hasher.finalize())
}

/// The loader name of an entry file (`<name>-<fingerprint>.json`).
fn entry_name(path: &Path) -> Option<&str> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit_once('-').map(|(name, _)| name)
}

/// Write an entry wholesale.
fn write_entry(path: &Path, entry: &CacheEntry) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content =
        serde_json::to_string(entry).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, content)?;
    trace!("Cached data to {:?}", path);
    Ok(())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
