use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::storage::cache::{CacheEntry, CacheStats};

/// Entries added without an explicit TTL live for a week.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const META_EXT: &str = "json";
const VALUE_EXT: &str = "val";
const TMP_EXT: &str = "tmp";

/// Every name the cache writes: `<hash>` plus one of these suffixes.
const OWNED_SUFFIXES: [&str; 4] = ["json", "val", "json.tmp", "val.tmp"];

/// Structural problem found by [`CacheSession::check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheIssue {
    UnreadableMetadata { path: PathBuf, reason: String },
    MissingValue { key: String, path: PathBuf },
    OrphanValue { path: PathBuf },
    SizeMismatch { key: String, expected: u64, actual: u64 },
    ChecksumMismatch { key: String },
    MisplacedEntry { key: String, path: PathBuf },
    StaleTempFile { path: PathBuf },
}

impl fmt::Display for CacheIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheIssue::UnreadableMetadata { path, reason } => {
                write!(f, "unreadable metadata {}: {}", path.display(), reason)
            }
            CacheIssue::MissingValue { key, path } => {
                write!(f, "value file {} missing for key {:?}", path.display(), key)
            }
            CacheIssue::OrphanValue { path } => {
                write!(f, "value file {} has no metadata", path.display())
            }
            CacheIssue::SizeMismatch { key, expected, actual } => {
                write!(f, "key {:?} expected {} bytes, found {}", key, expected, actual)
            }
            CacheIssue::ChecksumMismatch { key } => {
                write!(f, "key {:?} value does not match its checksum", key)
            }
            CacheIssue::MisplacedEntry { key, path } => {
                write!(f, "key {:?} stored under wrong name {}", key, path.display())
            }
            CacheIssue::StaleTempFile { path } => {
                write!(f, "leftover temp file {}", path.display())
            }
        }
    }
}

/// Disk-backed key/value cache.
///
/// Each entry is two files inside a shard directory named after the first two hex
/// digits of the key hash: `<hash>.json` holds the [`CacheEntry`] metadata and
/// `<hash>.val` holds the raw value. Writes go to a temp file and are renamed into
/// place, value first, so a reader never sees metadata for a half-written value.
#[derive(Debug)]
pub struct CacheSession {
    dir: PathBuf,
    max_size_bytes: u64,
    stats: Mutex<CacheStats>,
}

impl CacheSession {
    pub fn open(dir: impl Into<PathBuf>, max_size_bytes: u64) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|e| Error::Cache(format!(
                    "Failed to create cache directory '{}': {}",
                    dir.display(), e
                )))?;
        }

        debug!("Opened cache at {} (limit {} bytes)", dir.display(), max_size_bytes);

        Ok(Self {
            dir,
            max_size_bytes,
            stats: Mutex::new(CacheStats::default()),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_cache_size(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// True when an unexpired entry exists for `key`.
    pub fn is_incache(&self, key: &str) -> bool {
        matches!(self.lookup(key), Ok(Some(_)))
    }

    pub fn get_size(data: &[u8]) -> u64 {
        data.len() as u64
    }

    pub fn get_cached_size(&self, key: &str) -> Option<u64> {
        self.lookup(key).ok().flatten().map(|entry| entry.size)
    }

    /// Reads the value for `key`.
    ///
    /// Returns [`Error::NotFound`] on a miss and [`Error::Cache`] when the entry on
    /// disk does not agree with its metadata.
    pub fn get_cached_data(&self, key: &str) -> Result<Vec<u8>> {
        let entry = match self.lookup(key)? {
            Some(entry) => entry,
            None => {
                self.stats.lock().record_miss();
                return Err(Error::NotFound(format!("Cache miss for {}", key)));
            }
        };

        let (_, value_path) = self.entry_paths(key);
        let data = match fs::read(&value_path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::Cache(format!(
                    "Value file '{}' missing for {}",
                    value_path.display(), key
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if data.len() as u64 != entry.size {
            return Err(Error::Cache(format!(
                "Cached value for {} has {} bytes, expected {}",
                key, data.len(), entry.size
            )));
        }

        if checksum(&data) != entry.checksum {
            return Err(Error::Cache(format!("Cached value for {} fails its checksum", key)));
        }

        self.stats.lock().record_hit();
        Ok(data)
    }

    /// Stores `data` unless a live entry already exists. Uses [`DEFAULT_TTL`].
    pub fn add_to_cache(&self, key: &str, data: &[u8]) -> Result<bool> {
        self.add_with_ttl(key, data, Some(DEFAULT_TTL), None)
    }

    pub fn add_with_ttl(
        &self,
        key: &str,
        data: &[u8],
        ttl: Option<Duration>,
        tag: Option<&str>,
    ) -> Result<bool> {
        if let Ok(Some(_)) = self.lookup(key) {
            return Ok(false);
        }

        self.set(key, data, ttl, tag)?;
        Ok(true)
    }

    /// Stores `data`, replacing whatever was there.
    pub fn set(&self, key: &str, data: &[u8], ttl: Option<Duration>, tag: Option<&str>) -> Result<()> {
        let (meta_path, value_path) = self.entry_paths(key);
        if let Some(shard) = meta_path.parent() {
            fs::create_dir_all(shard)?;
        }

        let entry = CacheEntry::new(key, Self::get_size(data), checksum(data), ttl, tag);
        let meta = serde_json::to_vec(&entry)?;

        write_atomic(&value_path, data)?;
        write_atomic(&meta_path, &meta)?;

        debug!("Cached {} bytes for {}", entry.size, key);

        // The entry is already stored; a failed cull only leaves the cache oversized
        if let Err(e) = self.cull() {
            warn!("Cache cull after storing {} failed: {}", key, e);
        }
        Ok(())
    }

    pub fn remove_from_cache(&self, key: &str) -> Result<bool> {
        let (meta_path, value_path) = self.entry_paths(key);
        let existed = meta_path.exists();
        remove_entry_files(&meta_path, &value_path)?;
        Ok(existed)
    }

    /// Removes every file the cache wrote. Returns the number of entries removed.
    pub fn clear_cache(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.files() {
            if has_extension(&path, META_EXT) {
                removed += 1;
            }
            remove_if_exists(&path)?;
        }

        info!("Cleared {} cache entries from {}", removed, self.dir.display());
        Ok(removed)
    }

    /// Removes every entry stored with `tag`.
    pub fn evict(&self, tag: &str) -> Result<usize> {
        let mut removed = 0;
        for (meta_path, entry) in self.scan() {
            if entry.tag.as_deref() == Some(tag) {
                remove_entry_files(&meta_path, &meta_path.with_extension(VALUE_EXT))?;
                removed += 1;
            }
        }

        debug!("Evicted {} entries tagged {}", removed, tag);
        Ok(removed)
    }

    /// Drops expired entries, then the oldest entries until the volume fits the limit.
    pub fn cull(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;
        let mut live = Vec::new();

        for (meta_path, entry) in self.scan() {
            if entry.is_expired_at(now) {
                remove_entry_files(&meta_path, &meta_path.with_extension(VALUE_EXT))?;
                self.stats.lock().record_expiration();
                removed += 1;
            } else {
                live.push((meta_path, entry));
            }
        }

        let mut volume: u64 = live.iter().map(|(_, entry)| entry.size).sum();
        if volume > self.max_size_bytes {
            live.sort_by_key(|(_, entry)| entry.created_at);
            for (meta_path, entry) in live {
                if volume <= self.max_size_bytes {
                    break;
                }
                remove_entry_files(&meta_path, &meta_path.with_extension(VALUE_EXT))?;
                volume -= entry.size;
                self.stats.lock().record_eviction();
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("Culled {} cache entries", removed);
        }
        Ok(removed)
    }

    /// Total bytes of stored values
    pub fn volume(&self) -> u64 {
        self.scan().iter().map(|(_, entry)| entry.size).sum()
    }

    pub fn len(&self) -> usize {
        self.scan().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scans the cache directory for structural problems.
    ///
    /// With `fix` set, the files behind every reported issue are removed. An empty
    /// result means there was nothing to repair.
    pub fn check(&self, fix: bool) -> Result<Vec<CacheIssue>> {
        let mut issues = Vec::new();
        let mut values = Vec::new();

        for path in self.files() {
            if has_extension(&path, TMP_EXT) {
                issues.push(CacheIssue::StaleTempFile { path: path.clone() });
                if fix {
                    remove_if_exists(&path)?;
                }
            } else if has_extension(&path, VALUE_EXT) {
                values.push(path);
            } else if has_extension(&path, META_EXT) {
                if let Some(issue) = self.check_entry(&path) {
                    issues.push(issue);
                    if fix {
                        remove_entry_files(&path, &path.with_extension(VALUE_EXT))?;
                    }
                }
            }
        }

        for value_path in values {
            if value_path.exists() && !value_path.with_extension(META_EXT).exists() {
                issues.push(CacheIssue::OrphanValue { path: value_path.clone() });
                if fix {
                    remove_if_exists(&value_path)?;
                }
            }
        }

        for issue in &issues {
            warn!("Cache check: {}", issue);
        }
        info!("Cache check found {} issue(s){}", issues.len(), if fix && !issues.is_empty() { ", repaired" } else { "" });

        Ok(issues)
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_cached_data(key) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::Cache(format!("Undecodable cached value for {}: {}", key, e))),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        tag: Option<&str>,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, &bytes, ttl, tag)
    }

    fn check_entry(&self, meta_path: &Path) -> Option<CacheIssue> {
        let entry = match read_meta(meta_path) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                return Some(CacheIssue::UnreadableMetadata {
                    path: meta_path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let (expected_meta, _) = self.entry_paths(&entry.key);
        if expected_meta != meta_path {
            return Some(CacheIssue::MisplacedEntry {
                key: entry.key,
                path: meta_path.to_path_buf(),
            });
        }

        let value_path = meta_path.with_extension(VALUE_EXT);
        let data = match fs::read(&value_path) {
            Ok(data) => data,
            Err(_) => {
                return Some(CacheIssue::MissingValue { key: entry.key, path: value_path });
            }
        };

        if data.len() as u64 != entry.size {
            return Some(CacheIssue::SizeMismatch {
                key: entry.key,
                expected: entry.size,
                actual: data.len() as u64,
            });
        }

        if checksum(&data) != entry.checksum {
            return Some(CacheIssue::ChecksumMismatch { key: entry.key });
        }

        None
    }

    /// Metadata for `key`; expired entries are removed and reported as absent.
    fn lookup(&self, key: &str) -> Result<Option<CacheEntry>> {
        let (meta_path, value_path) = self.entry_paths(key);
        let entry = match read_meta(&meta_path)? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if entry.key != key {
            return Err(Error::Cache(format!(
                "Entry '{}' belongs to a different key",
                meta_path.display()
            )));
        }

        if entry.is_expired() {
            remove_entry_files(&meta_path, &value_path)?;
            self.stats.lock().record_expiration();
            return Ok(None);
        }

        Ok(Some(entry))
    }

    fn entry_paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let hash = hash_key(key);
        let base = self.dir.join(&hash[..2]).join(&hash);
        (base.with_extension(META_EXT), base.with_extension(VALUE_EXT))
    }

    /// Valid metadata files and their entries; unreadable ones are left to `check`.
    fn scan(&self) -> Vec<(PathBuf, CacheEntry)> {
        self.files()
            .into_iter()
            .filter(|path| has_extension(path, META_EXT))
            .filter_map(|path| match read_meta(&path) {
                Ok(Some(entry)) => Some((path, entry)),
                Ok(None) => None,
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    None
                }
            })
            .collect()
    }

    /// Files the cache owns. Anything else in the directory is never read or removed.
    fn files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.dir)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_cache_file(path))
            .collect()
    }
}

/// True for `<shard>/<hash>.<suffix>` where the shard is the first two digits of a
/// blake3 hex hash and the suffix is one the cache writes.
fn is_cache_file(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    let shard = match path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
        Some(shard) => shard,
        None => return false,
    };
    let (stem, suffix) = match name.split_once('.') {
        Some(parts) => parts,
        None => return false,
    };

    stem.len() == 64
        && stem.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        && shard.len() == 2
        && stem.starts_with(shard)
        && OWNED_SUFFIXES.contains(&suffix)
}

pub fn hash_key(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

fn checksum(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

fn read_meta(path: &Path) -> Result<Option<CacheEntry>> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| Error::Cache(format!("Unreadable cache metadata '{}': {}", path.display(), e)))
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let temp_file = path.with_extension(format!("{}.{}", ext, TMP_EXT));

    fs::write(&temp_file, data)
        .map_err(|e| Error::Cache(format!(
            "Failed to write cache file '{}': {}",
            temp_file.display(), e
        )))?;

    fs::rename(&temp_file, path)
        .map_err(|e| Error::Cache(format!(
            "Failed to rename cache file '{}' to '{}': {}",
            temp_file.display(), path.display(), e
        )))
}

fn remove_entry_files(meta_path: &Path, value_path: &Path) -> Result<()> {
    remove_if_exists(meta_path)?;
    remove_if_exists(value_path)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    fn session(dir: &TempDir) -> CacheSession {
        CacheSession::open(dir.path().join("cache"), 100 * 1024 * 1024).unwrap()
    }

    #[test]
    fn test_is_incache() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        assert!(!cache.is_incache("x"));
        assert!(cache.add_to_cache("x", b"data").unwrap());
        assert!(cache.is_incache("x"));
        assert_eq!(cache.get_cached_size("x"), Some(4));
    }

    #[test]
    fn test_get_cached_data_miss() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        let result = cache.get_cached_data("missing");
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(cache.get_cached_size("missing"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.add_to_cache("hello world", b"data").unwrap();
        assert_eq!(cache.get_cached_data("hello world").unwrap(), b"data");
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_get_size() {
        assert_eq!(CacheSession::get_size(b"hello world"), 11);
        assert_eq!(CacheSession::get_size(b""), 0);
    }

    #[test]
    fn test_add_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        assert!(cache.add_to_cache("k", b"first").unwrap());
        assert!(!cache.add_to_cache("k", b"second").unwrap());
        assert_eq!(cache.get_cached_data("k").unwrap(), b"first");

        cache.set("k", b"second", None, None).unwrap();
        assert_eq!(cache.get_cached_data("k").unwrap(), b"second");
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        session(&dir).add_to_cache("k", b"persisted").unwrap();

        let reopened = session(&dir);
        assert_eq!(reopened.get_cached_data("k").unwrap(), b"persisted");
    }

    #[test]
    fn test_expired_entry_is_not_returned() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.set("short", b"lived", Some(Duration::from_millis(10)), None).unwrap();
        assert!(cache.is_incache("short"));

        std::thread::sleep(Duration::from_millis(30));

        assert!(!cache.is_incache("short"));
        assert!(matches!(cache.get_cached_data("short"), Err(Error::NotFound(_))));
        assert!(cache.stats().expirations >= 1);
        // Expired entries may be replaced by add
        assert!(cache.add_to_cache("short", b"again").unwrap());
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.add_to_cache("a", b"1").unwrap();
        cache.add_to_cache("b", b"2").unwrap();
        cache.add_to_cache("c", b"3").unwrap();

        assert!(cache.remove_from_cache("a").unwrap());
        assert!(!cache.remove_from_cache("a").unwrap());
        assert!(!cache.is_incache("a"));

        assert_eq!(cache.clear_cache().unwrap(), 2);
        assert!(!cache.is_incache("b"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_by_tag() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.set("feed:a", b"1", None, Some("feed")).unwrap();
        cache.set("summary:a", b"2", None, Some("summary")).unwrap();
        cache.set("summary:b", b"3", None, Some("summary")).unwrap();

        assert_eq!(cache.evict("summary").unwrap(), 2);
        assert!(cache.is_incache("feed:a"));
        assert!(!cache.is_incache("summary:a"));
    }

    #[test]
    fn test_size_limit_evicts_oldest() {
        let dir = TempDir::new().unwrap();
        let cache = CacheSession::open(dir.path(), 10).unwrap();

        cache.set("one", b"aaaa", None, None).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        cache.set("two", b"bbbb", None, None).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        cache.set("three", b"cccc", None, None).unwrap();

        assert!(!cache.is_incache("one"));
        assert!(cache.is_incache("two"));
        assert!(cache.is_incache("three"));
        assert_eq!(cache.volume(), 8);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_check_clean_cache_reports_nothing() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.add_to_cache("a", b"fine").unwrap();
        assert!(cache.check(true).unwrap().is_empty());
        assert!(cache.is_incache("a"));
    }

    #[test]
    fn test_check_repairs_truncated_value() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.add_to_cache("a", b"full value").unwrap();
        let (_, value_path) = cache.entry_paths("a");
        fs::write(&value_path, b"cut").unwrap();

        assert!(matches!(cache.get_cached_data("a"), Err(Error::Cache(_))));

        let issues = cache.check(false).unwrap();
        assert_eq!(issues, vec![CacheIssue::SizeMismatch {
            key: "a".to_string(),
            expected: 10,
            actual: 3,
        }]);
        // Reporting alone changes nothing
        assert_eq!(cache.check(false).unwrap().len(), 1);

        assert_eq!(cache.check(true).unwrap().len(), 1);
        assert!(cache.check(true).unwrap().is_empty());
        assert!(matches!(cache.get_cached_data("a"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_check_detects_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.add_to_cache("a", b"abcd").unwrap();
        let (_, value_path) = cache.entry_paths("a");
        fs::write(&value_path, b"wxyz").unwrap();

        assert!(matches!(cache.get_cached_data("a"), Err(Error::Cache(_))));
        let issues = cache.check(true).unwrap();
        assert_eq!(issues, vec![CacheIssue::ChecksumMismatch { key: "a".to_string() }]);
    }

    #[test]
    fn test_check_repairs_unreadable_metadata() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.add_to_cache("a", b"data").unwrap();
        let (meta_path, value_path) = cache.entry_paths("a");
        fs::write(&meta_path, b"{not json").unwrap();

        assert!(matches!(cache.get_cached_data("a"), Err(Error::Cache(_))));

        let issues = cache.check(true).unwrap();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], CacheIssue::UnreadableMetadata { .. }));
        assert!(!meta_path.exists());
        assert!(!value_path.exists());
    }

    #[test]
    fn test_check_finds_orphans_and_temp_files() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.add_to_cache("kept", b"data").unwrap();
        cache.add_to_cache("orphaned", b"data").unwrap();
        cache.add_to_cache("valueless", b"data").unwrap();

        let (orphan_meta, _) = cache.entry_paths("orphaned");
        fs::remove_file(&orphan_meta).unwrap();
        let (_, missing_value) = cache.entry_paths("valueless");
        fs::remove_file(&missing_value).unwrap();
        let (_, partial_value) = cache.entry_paths("partial");
        fs::create_dir_all(partial_value.parent().unwrap()).unwrap();
        fs::write(partial_value.with_extension("val.tmp"), b"partial").unwrap();

        let issues = cache.check(true).unwrap();
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().any(|i| matches!(i, CacheIssue::OrphanValue { .. })));
        assert!(issues.iter().any(|i| matches!(i, CacheIssue::MissingValue { key, .. } if key == "valueless")));
        assert!(issues.iter().any(|i| matches!(i, CacheIssue::StaleTempFile { .. })));

        assert!(cache.check(false).unwrap().is_empty());
        assert!(cache.is_incache("kept"));
    }

    #[test]
    fn test_check_detects_misplaced_entry() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.add_to_cache("a", b"data").unwrap();
        let (meta_path, value_path) = cache.entry_paths("a");
        let (wrong_meta, wrong_value) = cache.entry_paths("b");
        fs::create_dir_all(wrong_meta.parent().unwrap()).unwrap();
        fs::rename(&meta_path, &wrong_meta).unwrap();
        fs::rename(&value_path, &wrong_value).unwrap();

        assert!(matches!(cache.get_cached_data("b"), Err(Error::Cache(_))));
        let issues = cache.check(true).unwrap();
        assert!(matches!(&issues[..], [CacheIssue::MisplacedEntry { key, .. }] if key == "a"));
    }

    #[test]
    fn test_foreign_files_are_left_alone() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.add_to_cache("a", b"data").unwrap();
        let (meta_path, _) = cache.entry_paths("a");
        let shard = meta_path.parent().unwrap().to_path_buf();

        let foreign = vec![
            cache.cache_dir().join("notes.txt"),
            cache.cache_dir().join("settings.json"),
            cache.cache_dir().join("draft.val.tmp"),
            shard.join("notes.txt"),
            shard.join("settings.json"),
            cache.cache_dir().join("zz").join(meta_path.file_name().unwrap()),
        ];
        for path in &foreign {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, br#"{"a":1}"#).unwrap();
        }

        assert!(cache.check(true).unwrap().is_empty());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.clear_cache().unwrap(), 1);
        assert!(cache.is_empty());

        for path in &foreign {
            assert!(path.exists(), "{} was removed", path.display());
        }
    }

    #[test]
    fn test_is_cache_file() {
        let hash = hash_key("a");
        let shard = Path::new("/cache").join(&hash[..2]);

        for suffix in OWNED_SUFFIXES {
            assert!(is_cache_file(&shard.join(format!("{}.{}", hash, suffix))));
        }
        assert!(!is_cache_file(&shard.join(format!("{}.txt", hash))));
        assert!(!is_cache_file(&shard.join(format!("{}.json", hash.to_uppercase()))));
        assert!(!is_cache_file(&shard.join("settings.json")));
        assert!(!is_cache_file(&Path::new("/cache/zz").join(format!("{}.json", hash))));
    }

    #[test]
    fn test_set_succeeds_when_cull_fails() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.set("old", b"stale", Some(Duration::from_millis(10)), None).unwrap();
        std::thread::sleep(Duration::from_millis(30));

        // A directory in place of the value file makes culling "old" fail
        let (old_meta, old_value) = cache.entry_paths("old");
        fs::remove_file(&old_value).unwrap();
        fs::create_dir(&old_value).unwrap();

        cache.set("new", b"fresh", None, None).unwrap();
        assert_eq!(cache.get_cached_data("new").unwrap(), b"fresh");

        // The cull ran and stopped at the value it could not remove
        assert!(!old_meta.exists());
        assert!(old_value.is_dir());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        title: String,
        count: u32,
    }

    #[test]
    fn test_json_helpers() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);
        let sample = Sample { title: "News".to_string(), count: 3 };

        assert_eq!(cache.get_json::<Sample>("sample").unwrap(), None);
        cache.set_json("sample", &sample, Some(Duration::from_secs(60)), Some("test")).unwrap();
        assert_eq!(cache.get_json::<Sample>("sample").unwrap(), Some(sample));
    }

    #[test]
    fn test_undecodable_json_is_cache_error() {
        let dir = TempDir::new().unwrap();
        let cache = session(&dir);

        cache.set("sample", b"[1, 2", None, None).unwrap();
        assert!(matches!(cache.get_json::<Sample>("sample"), Err(Error::Cache(_))));
    }
}
