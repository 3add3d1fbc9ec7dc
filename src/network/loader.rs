//! Text resource loader
//!
//! Resolves references against a base URL and loads them by scheme:
//! `res:` from an in-memory table, `file:` from disk, `data:` inline and
//! `http(s):` through the disk cache and a blocking HTTP client.

use super::cache::DiskCache;
use crate::config::EngineConfig;
use crate::utils::error::{NetworkError, Result, WebError};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

/// Loader for pages, stylesheets and scripts.
///
/// Clones share the resource table and the cache directory, so a clone can
/// load on a worker thread.
#[derive(Debug, Clone)]
pub struct WebLoader {
    resources: Arc<RwLock<HashMap<String, String>>>,
    cache: Option<DiskCache>,
    base_url: Option<Url>,
    timeout: Duration,
    user_agent: String,
}

impl WebLoader {
    /// Build a loader from `config`. A cache directory that cannot be
    /// created disables caching.
    pub fn new(config: &EngineConfig) -> Self {
        let cache = config.cache_dir.as_ref().and_then(|dir| {
            DiskCache::new(dir, config.cache_lifetime)
                .inspect_err(|err| log::warn!("disk cache disabled: {err}"))
                .ok()
        });
        Self {
            resources: Arc::new(RwLock::new(HashMap::new())),
            cache,
            base_url: None,
            timeout: config.request_timeout,
            user_agent: config.user_agent.clone(),
        }
    }

    pub fn cache(&self) -> Option<&DiskCache> {
        self.cache.as_ref()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn set_base_url(&mut self, base_url: Option<Url>) {
        self.base_url = base_url;
    }

    /// Register text served for `res:<name>`
    pub fn add_resource(&self, name: impl Into<String>, content: impl Into<String>) {
        if let Ok(mut resources) = self.resources.write() {
            resources.insert(name.into(), content.into());
        }
    }

    /// Resolve `reference` against the base URL. Without a base, a
    /// relative reference is taken as a path under the working directory.
    pub fn resolve(&self, reference: &str) -> Result<Url> {
        match Url::parse(reference) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => Ok(base.join(reference)?),
                None => {
                    let path = std::env::current_dir()?.join(reference);
                    Url::from_file_path(&path).map_err(|()| {
                        WebError::Document(format!("cannot express {} as a URL", path.display()))
                    })
                }
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve and load `reference` as text
    pub fn load_text(&self, reference: &str) -> Result<String> {
        let url = self.resolve(reference)?;
        self.load_url(&url)
    }

    pub fn load_url(&self, url: &Url) -> Result<String> {
        log::debug!("loading {url}");
        match url.scheme() {
            "res" => self.load_resource(url),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| NetworkError::ResourceNotFound(url.to_string()))?;
                Ok(fs::read_to_string(path)?)
            }
            "data" => decode_data_url(url.as_str()),
            "http" | "https" => self.load_http(url),
            other => Err(NetworkError::UnsupportedScheme(other.to_string()).into()),
        }
    }

    /// `res:` lookups use the last path segment, or the host for
    /// `res://name`
    fn load_resource(&self, url: &Url) -> Result<String> {
        let name = url
            .path()
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .or_else(|| url.host_str())
            .unwrap_or_default();
        self.resources
            .read()
            .ok()
            .and_then(|resources| resources.get(name).cloned())
            .ok_or_else(|| NetworkError::ResourceNotFound(name.to_string()).into())
    }

    fn load_http(&self, url: &Url) -> Result<String> {
        if let Some(content) = self.cache.as_ref().and_then(|c| c.get(url.as_str())) {
            return Ok(content);
        }

        let client = reqwest::blocking::Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.timeout)
            .build()
            .map_err(NetworkError::from)?;
        let body = client
            .get(url.as_str())
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(NetworkError::from)?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(url.as_str(), &body) {
                log::warn!("{err}");
            }
        }
        Ok(body)
    }
}

/// Decode `data:[<mediatype>][;base64],<payload>` into text
fn decode_data_url(url: &str) -> Result<String> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| NetworkError::DataUrl(url.to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| NetworkError::DataUrl("missing `,`".to_string()))?;

    let bytes = if header.to_ascii_lowercase().ends_with(";base64") {
        let compact: String = percent_decode(payload)
            .into_iter()
            .map(char::from)
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        STANDARD
            .decode(compact)
            .map_err(|err| NetworkError::DataUrl(err.to_string()))?
    } else {
        percent_decode(payload)
    };

    String::from_utf8(bytes).map_err(|_| NetworkError::Encoding("data url".to_string()).into())
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3).and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(byte) = hex {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}
