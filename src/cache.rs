//! Content-addressed upload cache
//!
//! [`MediaCache`] sits in front of any [`CdnService`] and remembers the URL
//! each distinct piece of content was published under, keyed by an MD5
//! digest of the bytes. The table lives in memory for the duration of a run
//! and is loaded from / saved to a JSON file explicitly by the caller.

use crate::cdn::CdnService;
use crate::models::MediaItem;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, ErrorKind, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// MD5 digest of an item's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; ContentHash::LEN]);

impl ContentHash {
    pub const LEN: usize = 16;

    pub fn of(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    /// Decode a hex cache key. Anything that is not exactly [`Self::LEN`]
    /// bytes of hex is rejected.
    pub fn from_hex(key: &str) -> Result<Self> {
        let bytes = hex::decode(key)
            .map_err(|e| Error::CacheDecode(format!("invalid key {:?}: {}", key, e)))?;
        let digest: [u8; Self::LEN] = bytes.as_slice().try_into().map_err(|_| {
            Error::CacheDecode(format!(
                "invalid key {:?}: {} bytes, expected {}",
                key,
                bytes.len(),
                Self::LEN
            ))
        })?;
        Ok(Self(digest))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: String,
    pub url: String,
}

/// Deduplicating decorator over a CDN backend.
pub struct MediaCache {
    entries: RwLock<HashMap<ContentHash, CacheEntry>>,
    inner: Arc<dyn CdnService>,
}

impl MediaCache {
    pub fn new(inner: Arc<dyn CdnService>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            inner,
        }
    }

    fn read_table(&self) -> RwLockReadGuard<'_, HashMap<ContentHash, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, HashMap<ContentHash, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, hash: &ContentHash) -> Option<CacheEntry> {
        self.read_table().get(hash).cloned()
    }

    /// Record an entry unless one already exists for `hash`; existing
    /// entries are never replaced.
    fn insert(&self, hash: ContentHash, entry: CacheEntry) {
        self.write_table().entry(hash).or_insert(entry);
    }

    pub fn len(&self) -> usize {
        self.read_table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> HashMap<ContentHash, CacheEntry> {
        self.read_table().clone()
    }

    /// Merge the table stored at `path` into memory.
    ///
    /// A missing file leaves the cache as it is. The file is fully decoded
    /// before anything is merged, so a bad file never touches the table.
    pub async fn load_file(&self, path: &Path) -> Result<()> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Cache file {} not found, starting empty", path.display());
                return Ok(());
            }
            Err(source) => {
                return Err(Error::CacheIo {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let stored: HashMap<String, CacheEntry> = serde_json::from_slice(&data)
            .map_err(|e| Error::CacheDecode(format!("{}: {}", path.display(), e)))?;

        let decoded = stored
            .into_iter()
            .map(|(key, entry)| -> Result<(ContentHash, CacheEntry)> {
                Ok((ContentHash::from_hex(&key)?, entry))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut table = self.write_table();
        let count = decoded.len();
        for (hash, entry) in decoded {
            table.entry(hash).or_insert(entry);
        }
        drop(table);

        info!("Loaded {} cache entries from {}", count, path.display());
        Ok(())
    }

    /// Write the table to `path` as pretty-printed JSON readable only by the owner.
    ///
    /// The table goes to a temporary file next to `path` that is renamed over
    /// it once fully written, so an interrupted save leaves the old file alone.
    pub async fn save_file(&self, path: &Path) -> Result<()> {
        let stored: BTreeMap<String, CacheEntry> = self
            .read_table()
            .iter()
            .map(|(hash, entry)| (hash.to_hex(), entry.clone()))
            .collect();
        let json = serde_json::to_string_pretty(&stored)?;

        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || replace_file(&target, json.as_bytes()))
            .await?
            .map_err(|source| Error::CacheIo {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Saved {} cache entries to {}", stored.len(), path.display());
        Ok(())
    }
}

fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl CdnService for MediaCache {
    async fn upload(&self, item: &MediaItem) -> Result<String> {
        let hash = ContentHash::of(&item.data);

        if let Some(entry) = self.get(&hash) {
            if entry.path != item.path {
                warn!(
                    hash = %hash,
                    cached_path = %entry.path,
                    path = %item.path,
                    "Content of {} was already uploaded from a different path",
                    item.name
                );
            }
            debug!("Cache hit for {}", item.name);
            return Ok(entry.url);
        }

        let url = self.inner.upload(item).await?;
        self.insert(
            hash,
            CacheEntry {
                path: item.path.clone(),
                url: url.clone(),
            },
        );
        Ok(url)
    }
}
