//! Data models and configuration
//!
//! Defines the media items flowing through the uploader and the
//! environment-driven configuration used to pick and build a CDN backend.

use crate::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A single file to publish.
///
/// `path` identifies the item within a batch; `url` stays `None` until an
/// upload succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaItem {
    pub name: String,
    pub path: String,
    pub data: Vec<u8>,
    pub url: Option<String>,
}

impl MediaItem {
    pub fn new(name: impl Into<String>, path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            data,
            url: None,
        }
    }

    pub fn with_url(mut self, url: String) -> Self {
        self.url = Some(url);
        self
    }

    /// Lowercased file extension of `name`, without the dot.
    pub fn extension(&self) -> Option<String> {
        let idx = self.name.rfind('.')?;
        if idx == 0 || idx + 1 == self.name.len() {
            return None;
        }
        Some(self.name[idx + 1..].to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdnKind {
    S3,
    Telegraph,
    PostImage,
    Mock,
}

impl FromStr for CdnKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "telegraph" => Ok(Self::Telegraph),
            "post-image" | "postimage" => Ok(Self::PostImage),
            "mock" => Ok(Self::Mock),
            "" => Err(Error::Config("cdn type is not configured".to_string())),
            other => Err(Error::Config(format!("unsupported cdn type: {:?}", other))),
        }
    }
}

impl fmt::Display for CdnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::S3 => "s3",
            Self::Telegraph => "telegraph",
            Self::PostImage => "post-image",
            Self::Mock => "mock",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: String,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub location: String,
    pub public_url: Option<String>,
}

/// Telegraph account used to publish pages.
#[derive(Debug, Clone, Default)]
pub struct TelegraphAccount {
    pub author_name: Option<String>,
    pub short_name: Option<String>,
    pub author_url: Option<String>,
    pub access_token: Option<String>,
}

impl TelegraphAccount {
    /// Account short name, falling back to the author name.
    pub fn short_name(&self) -> Option<&str> {
        self.short_name.as_deref().or(self.author_name.as_deref())
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub cdn: Option<CdnKind>,
    pub parallel: usize,
    pub cache_file: Option<PathBuf>,
    pub postimg_api_key: Option<String>,
    pub s3: S3Config,
    pub telegraph: TelegraphAccount,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cdn = get("CDN_TYPE").map(|v| v.parse::<CdnKind>()).transpose()?;
        let parallel = match get("UPLOAD_PARALLEL") {
            Some(raw) => parse_parallel(&raw)?,
            None => crate::uploader::DEFAULT_PARALLEL,
        };

        Ok(Self {
            cdn,
            parallel,
            cache_file: get("UPLOAD_CACHE").map(PathBuf::from),
            postimg_api_key: get("POSTIMG_API_KEY"),
            s3: S3Config {
                key_id: get("AWS_KEY_ID"),
                secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
                region: get("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                endpoint: get("AWS_ENDPOINT"),
                bucket: get("AWS_S3_BUCKET"),
                location: get("AWS_S3_LOCATION").unwrap_or_else(|| "/".to_string()),
                public_url: get("AWS_S3_PUBLIC_URL"),
            },
            telegraph: TelegraphAccount {
                author_name: get("TELEGRAPH_AUTHOR_NAME"),
                short_name: get("TELEGRAPH_SHORT_NAME"),
                author_url: get("TELEGRAPH_AUTHOR_URL"),
                access_token: get("TELEGRAPH_ACCESS_TOKEN"),
            },
        })
    }
}

/// Parse a parallelism setting. Zero is rejected.
pub fn parse_parallel(raw: &str) -> Result<usize> {
    let parallel: usize = raw
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid parallelism {:?}", raw)))?;
    if parallel == 0 {
        return Err(Error::Config("parallel must be at least 1".to_string()));
    }
    Ok(parallel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_media_item_extension() {
        assert_eq!(
            MediaItem::new("photo.JPG", "a/photo.JPG", vec![]).extension(),
            Some("jpg".to_string())
        );
        assert_eq!(MediaItem::new("README", "README", vec![]).extension(), None);
        assert_eq!(MediaItem::new(".hidden", ".hidden", vec![]).extension(), None);
        assert_eq!(MediaItem::new("trailing.", "trailing.", vec![]).extension(), None);
    }

    #[test]
    fn test_cdn_kind_parsing() {
        assert_eq!("s3".parse::<CdnKind>().unwrap(), CdnKind::S3);
        assert_eq!("Telegraph".parse::<CdnKind>().unwrap(), CdnKind::Telegraph);
        assert_eq!("post-image".parse::<CdnKind>().unwrap(), CdnKind::PostImage);
        assert!(matches!("ftp".parse::<CdnKind>(), Err(Error::Config(_))));
        assert!(matches!("".parse::<CdnKind>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.cdn, None);
        assert_eq!(config.parallel, 8);
        assert!(config.cache_file.is_none());
        assert_eq!(config.s3.region, "us-east-1");
        assert_eq!(config.s3.location, "/");
    }

    #[test]
    fn test_config_reads_values() {
        let config = Config::from_lookup(lookup(&[
            ("CDN_TYPE", "s3"),
            ("UPLOAD_PARALLEL", "3"),
            ("UPLOAD_CACHE", "/tmp/cache.json"),
            ("AWS_S3_BUCKET", "media"),
            ("AWS_ENDPOINT", ""),
        ]))
        .unwrap();

        assert_eq!(config.cdn, Some(CdnKind::S3));
        assert_eq!(config.parallel, 3);
        assert_eq!(config.cache_file, Some(PathBuf::from("/tmp/cache.json")));
        assert_eq!(config.s3.bucket.as_deref(), Some("media"));
        assert!(config.s3.endpoint.is_none());
    }

    #[test]
    fn test_telegraph_account_from_env() {
        let config = Config::from_lookup(lookup(&[
            ("TELEGRAPH_AUTHOR_NAME", "Ann"),
            ("TELEGRAPH_ACCESS_TOKEN", "tok"),
        ]))
        .unwrap();

        assert_eq!(config.telegraph.access_token.as_deref(), Some("tok"));
        assert_eq!(config.telegraph.short_name(), Some("Ann"));
        assert!(Config::from_lookup(lookup(&[]))
            .unwrap()
            .telegraph
            .short_name()
            .is_none());
    }

    #[test]
    fn test_zero_parallel_is_rejected() {
        let err = Config::from_lookup(lookup(&[("UPLOAD_PARALLEL", "0")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(parse_parallel("abc").is_err());
        assert_eq!(parse_parallel(" 4 ").unwrap(), 4);
    }
}
