//! CDN backends for publishing media
//!
//! Every backend turns one [`MediaItem`] into a public URL. The uploader and
//! the cache only ever see the [`CdnService`] trait, so backends can be
//! swapped or wrapped without either of them noticing.

pub mod client;
pub mod mime;
pub mod mock;
pub mod postimages;
pub mod telegraph;

pub use client::CdnClient;
pub use mock::MockCdnClient;
pub use postimages::PostImageClient;
pub use telegraph::TelegraphClient;

use crate::models::{CdnKind, Config, MediaItem};
use crate::page::PagePublisher;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait CdnService: Send + Sync {
    /// Upload the item's bytes and return the URL they are served from.
    async fn upload(&self, item: &MediaItem) -> Result<String>;
}

/// Build the backend for `kind` from `config`.
pub async fn build_cdn(kind: CdnKind, config: &Config) -> Result<Arc<dyn CdnService>> {
    info!("CDN backend: {}", kind);

    let cdn: Arc<dyn CdnService> = match kind {
        CdnKind::S3 => Arc::new(CdnClient::new(&config.s3).await?),
        CdnKind::Telegraph => Arc::new(TelegraphClient::new(reqwest::Client::new())),
        CdnKind::PostImage => {
            let api_key = config
                .postimg_api_key
                .clone()
                .ok_or_else(|| Error::Config("post-image: no api key provided".to_string()))?;
            Arc::new(PostImageClient::new(api_key, reqwest::Client::new()))
        }
        CdnKind::Mock => Arc::new(MockCdnClient::new()),
    };

    Ok(cdn)
}

/// Build the page publisher: Telegraph, or the mock for dry runs.
pub async fn build_publisher(dry_run: bool, config: &Config) -> Result<Arc<dyn PagePublisher>> {
    if dry_run {
        return Ok(Arc::new(MockCdnClient::new()));
    }

    let client = TelegraphClient::new(reqwest::Client::new())
        .login(&config.telegraph)
        .await?;
    Ok(Arc::new(client))
}
