//! Host configuration

use crate::utils::error::{Result, WebError};
use std::path::PathBuf;
use std::time::Duration;

/// Default lifetime of a disk cache entry
pub const DEFAULT_CACHE_LIFETIME: Duration = Duration::from_secs(12 * 60 * 60);

/// Configuration shared by the runtime, the loader and the page
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Disk cache root; `None` disables caching
    pub cache_dir: Option<PathBuf>,
    /// Entries older than this are deleted on access
    pub cache_lifetime: Duration,
    /// Root directory for module `import` resolution
    pub module_root: PathBuf,
    /// Timeout for HTTP fetches
    pub request_timeout: Duration,
    /// Maximum retained console lines per context
    pub console_capacity: usize,
    /// User agent sent with HTTP fetches
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: Some(std::env::temp_dir().join("webhost-cache")),
            cache_lifetime: DEFAULT_CACHE_LIFETIME,
            module_root: PathBuf::from("."),
            request_timeout: Duration::from_secs(30),
            console_capacity: 1000,
            user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Recognised keys: `WEBHOST_CACHE_DIR`, `WEBHOST_CACHE_LIFETIME_SECS`,
    /// `WEBHOST_MODULE_ROOT` and `WEBHOST_NO_CACHE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("WEBHOST_CACHE_DIR") {
            config.cache_dir = Some(PathBuf::from(dir));
        }

        if let Some(secs) = lookup("WEBHOST_CACHE_LIFETIME_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                WebError::Config(format!("WEBHOST_CACHE_LIFETIME_SECS is not a number: {secs}"))
            })?;
            config.cache_lifetime = Duration::from_secs(secs);
        }

        if let Some(root) = lookup("WEBHOST_MODULE_ROOT") {
            config.module_root = PathBuf::from(root);
        }

        if let Some(flag) = lookup("WEBHOST_NO_CACHE") {
            match flag.trim() {
                "1" | "true" | "yes" => config.cache_dir = None,
                "0" | "false" | "no" | "" => {}
                other => {
                    return Err(WebError::Config(format!(
                        "WEBHOST_NO_CACHE expects a boolean, got `{other}`"
                    )));
                }
            }
        }

        Ok(config)
    }

    /// Configuration without a disk cache, useful for embedding and tests
    pub fn without_cache() -> Self {
        Self {
            cache_dir: None,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_lifetime, Duration::from_secs(43_200));
        assert!(config.cache_dir.is_some());
        assert_eq!(config.console_capacity, 1000);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("WEBHOST_CACHE_DIR", "/tmp/pages"),
            ("WEBHOST_CACHE_LIFETIME_SECS", "60"),
            ("WEBHOST_MODULE_ROOT", "/srv/modules"),
        ]))
        .unwrap();

        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/pages")));
        assert_eq!(config.cache_lifetime, Duration::from_secs(60));
        assert_eq!(config.module_root, PathBuf::from("/srv/modules"));
    }

    #[test]
    fn test_no_cache_flag() {
        let config = EngineConfig::from_lookup(lookup_from(&[("WEBHOST_NO_CACHE", "1")])).unwrap();
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[("WEBHOST_CACHE_LIFETIME_SECS", "soon")]));
        assert!(matches!(err, Err(WebError::Config(_))));

        let err = EngineConfig::from_lookup(lookup_from(&[("WEBHOST_NO_CACHE", "maybe")]));
        assert!(matches!(err, Err(WebError::Config(_))));
    }
}
