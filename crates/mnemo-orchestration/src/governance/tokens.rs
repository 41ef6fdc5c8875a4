//! Governance token loading.
//!
//! Tokens are units of engineering guidance grouped by domain. The engine
//! is injected with a [`TokenLoader`]; the default implementation reads a
//! tags directory laid out as `<base>/<domain>/<token-name>.<ext>`. Loads
//! are cached per domain with a TTL, and a cache entry is invalidated
//! early when the loader reports a newer source version (directory mtime
//! for the file loader).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use moka::sync::Cache;
use tracing::debug;

/// A loaded governance token. `token_ref` (`kind::name`) is the stable
/// identity used for metric accumulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub kind: String,
    pub name: String,
    /// Where the token came from, for display only.
    pub source: Option<String>,
    pub description: Option<String>,
    pub rules: Vec<String>,
}

impl TokenRecord {
    pub fn token_ref(&self) -> String {
        format!("{}::{}", self.kind, self.name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenLoadError {
    #[error("token domain '{0}' not found")]
    DomainNotFound(String),
    #[error("io error reading tokens: {0}")]
    Io(#[from] std::io::Error),
}

/// Supplies tokens grouped by domain.
pub trait TokenLoader: Send + Sync {
    fn load(&self, domain: &str) -> Result<Vec<TokenRecord>, TokenLoadError>;

    /// Version marker for the domain's backing source; a change
    /// invalidates cached loads before their TTL expires.
    fn source_version(&self, _domain: &str) -> Option<SystemTime> {
        None
    }
}

/// Loads tokens from a tags directory: one subdirectory per domain, one
/// file per token, token name taken from the file stem.
#[derive(Debug, Clone)]
pub struct FileTokenLoader {
    base_dir: PathBuf,
}

impl FileTokenLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn domain_dir(&self, domain: &str) -> PathBuf {
        self.base_dir.join(domain)
    }
}

impl TokenLoader for FileTokenLoader {
    fn load(&self, domain: &str) -> Result<Vec<TokenRecord>, TokenLoadError> {
        let dir = self.domain_dir(domain);
        if !dir.is_dir() {
            return Err(TokenLoadError::DomainNotFound(domain.to_string()));
        }

        let mut tokens = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .filter(|e| e.path().is_file())
            .collect();
        entries.sort_by_key(std::fs::DirEntry::file_name);

        for entry in entries {
            let path = entry.path();
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            tokens.push(TokenRecord {
                kind: domain.to_string(),
                name: name.to_string(),
                source: relative_source(&self.base_dir, &path),
                description: None,
                rules: Vec::new(),
            });
        }
        Ok(tokens)
    }

    fn source_version(&self, domain: &str) -> Option<SystemTime> {
        std::fs::metadata(self.domain_dir(domain))
            .and_then(|m| m.modified())
            .ok()
    }
}

fn relative_source(base: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(base)
        .ok()
        .or(Some(path))
        .map(|p| p.to_string_lossy().into_owned())
}

struct CachedDomain {
    tokens: Vec<TokenRecord>,
    version: Option<SystemTime>,
}

/// TTL cache over a [`TokenLoader`], with source-version invalidation.
/// Safe to share across tasks.
pub struct CachedTokenSource {
    loader: Arc<dyn TokenLoader>,
    cache: Cache<String, Arc<CachedDomain>>,
}

impl std::fmt::Debug for CachedTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTokenSource").finish_non_exhaustive()
    }
}

impl CachedTokenSource {
    pub fn new(loader: Arc<dyn TokenLoader>, ttl: Duration) -> Self {
        Self {
            loader,
            cache: Cache::builder().time_to_live(ttl).max_capacity(64).build(),
        }
    }

    /// Tokens for a domain, served from cache while fresh.
    pub fn tokens(&self, domain: &str) -> Result<Vec<TokenRecord>, TokenLoadError> {
        if let Some(cached) = self.cache.get(domain) {
            if self.loader.source_version(domain) == cached.version {
                return Ok(cached.tokens.clone());
            }
            debug!(domain, "token cache invalidated by source version change");
            self.cache.invalidate(domain);
        }

        let tokens = self.loader.load(domain)?;
        let version = self.loader.source_version(domain);
        self.cache.insert(
            domain.to_string(),
            Arc::new(CachedDomain {
                tokens: tokens.clone(),
                version,
            }),
        );
        Ok(tokens)
    }
}
