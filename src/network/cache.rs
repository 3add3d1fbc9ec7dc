//! Disk cache for fetched text resources
//!
//! One file per URL, named by the SHA-256 of the normalized URL. An entry
//! older than the configured lifetime, or empty, is invalid and is deleted
//! the next time it is looked up.

use crate::utils::error::{Result, WebError};
use ring::digest;
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use url::Url;

/// On-disk cache rooted at one directory
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    lifetime: Duration,
}

impl DiskCache {
    /// Open (creating if needed) a cache rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>, lifetime: Duration) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| {
            WebError::Cache(format!("cannot create {}: {err}", dir.display()))
        })?;
        Ok(Self { dir, lifetime })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Cache key: lowercase hex SHA-256 of the URL without its fragment.
    /// Unparseable input is hashed verbatim.
    pub fn key_for(url: &str) -> String {
        let normalized = match Url::parse(url) {
            Ok(mut parsed) => {
                parsed.set_fragment(None);
                parsed.to_string()
            }
            Err(_) => url.to_string(),
        };
        let hash = digest::digest(&digest::SHA256, normalized.as_bytes());
        hash.as_ref().iter().fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
    }

    pub fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(Self::key_for(url))
    }

    /// Cached content for `url`, deleting the entry if it is stale or empty
    pub fn get(&self, url: &str) -> Option<String> {
        let path = self.entry_path(url);
        let metadata = fs::metadata(&path).ok()?;

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();

        if metadata.len() == 0 || age > self.lifetime {
            log::debug!("evicting cache entry for {url} (age {}s)", age.as_secs());
            self.remove_path(&path);
            return None;
        }

        match fs::read_to_string(&path) {
            Ok(content) => {
                log::trace!("cache hit for {url}");
                Some(content)
            }
            Err(err) => {
                log::warn!("unreadable cache entry {}: {err}", path.display());
                self.remove_path(&path);
                None
            }
        }
    }

    pub fn put(&self, url: &str, content: &str) -> Result<()> {
        let path = self.entry_path(url);
        fs::write(&path, content)
            .map_err(|err| WebError::Cache(format!("cannot write {}: {err}", path.display())))
    }

    pub fn remove(&self, url: &str) {
        self.remove_path(&self.entry_path(url));
    }

    /// Delete every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn remove_path(&self, path: &Path) {
        if let Err(err) = fs::remove_file(path) {
            if err.kind() != ErrorKind::NotFound {
                log::warn!("cannot delete cache entry {}: {err}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn temp_cache(name: &str, lifetime: Duration) -> DiskCache {
        let dir = std::env::temp_dir().join(format!("webhost-cache-test-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        DiskCache::new(dir, lifetime).unwrap()
    }

    #[test]
    fn test_key_ignores_fragment() {
        let a = DiskCache::key_for("http://example.com/page#top");
        let b = DiskCache::key_for("http://example.com/page");
        let c = DiskCache::key_for("http://example.com/other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_key_normalizes_scheme_and_host() {
        assert_eq!(
            DiskCache::key_for("HTTP://Example.COM/a"),
            DiskCache::key_for("http://example.com/a")
        );
    }

    #[test]
    fn test_put_get_remove() {
        let cache = temp_cache("roundtrip", Duration::from_secs(60));
        assert!(cache.get("http://example.com/").is_none());

        cache.put("http://example.com/", "<p>cached</p>").unwrap();
        assert_eq!(cache.get("http://example.com/").as_deref(), Some("<p>cached</p>"));

        cache.remove("http://example.com/");
        assert!(cache.get("http://example.com/").is_none());
        let _ = fs::remove_dir_all(cache.dir());
    }

    #[test]
    fn test_empty_entry_is_deleted() {
        let cache = temp_cache("empty", Duration::from_secs(60));
        cache.put("http://example.com/empty", "").unwrap();
        assert!(cache.get("http://example.com/empty").is_none());
        assert!(!cache.entry_path("http://example.com/empty").exists());
        let _ = fs::remove_dir_all(cache.dir());
    }

    #[test]
    fn test_expired_entry_is_deleted() {
        let cache = temp_cache("expired", Duration::from_secs(60));
        cache.put("http://example.com/old", "stale").unwrap();

        let path = cache.entry_path("http://example.com/old");
        let old = SystemTime::now() - Duration::from_secs(3600);
        File::options().write(true).open(&path).unwrap().set_modified(old).unwrap();

        assert!(cache.get("http://example.com/old").is_none());
        assert!(!path.exists());
        let _ = fs::remove_dir_all(cache.dir());
    }

    #[test]
    fn test_clear() {
        let cache = temp_cache("clear", Duration::from_secs(60));
        cache.put("http://a.example/", "a").unwrap();
        cache.put("http://b.example/", "b").unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.get("http://a.example/").is_none());
        let _ = fs::remove_dir_all(cache.dir());
    }
}
