use super::mime::detect_media_mime;
use super::CdnService;
use crate::models::{MediaItem, S3Config};
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, types::ObjectCannedAcl, Client as S3Client};
use sha2::{Digest, Sha256};

/// S3-compatible object store backend.
///
/// Objects are keyed by content, so re-uploading the same bytes overwrites
/// the same object instead of creating a new one.
pub struct CdnClient {
    client: S3Client,
    bucket: String,
    root: String,
    base_url: String,
}

impl CdnClient {
    pub async fn new(settings: &S3Config) -> Result<Self> {
        let (Some(key_id), Some(secret)) = (&settings.key_id, &settings.secret_access_key) else {
            return Err(Error::Config("s3: missing credentials".to_string()));
        };
        let (Some(bucket), Some(public_url)) = (&settings.bucket, &settings.public_url) else {
            return Err(Error::Config(
                "s3: bucket and public URL must be configured".to_string(),
            ));
        };

        let credentials = aws_sdk_s3::config::Credentials::new(
            key_id.clone(),
            secret.clone(),
            None,
            None,
            "mediacdn-uploader",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(settings.region.clone()));
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;

        Ok(Self {
            client: S3Client::new(&config),
            bucket: bucket.clone(),
            root: normalize_root(&settings.location),
            base_url: public_url.trim_end_matches(['/', '\\']).to_string(),
        })
    }

    fn get_public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

fn normalize_root(location: &str) -> String {
    location.trim_matches(['/', '\\']).to_string()
}

/// Object key for `item`: a content digest plus the original extension,
/// placed under `root`.
pub fn object_key(root: &str, item: &MediaItem) -> String {
    let digest = hex::encode(Sha256::digest(&item.data));
    let mut key = digest[..32].to_string();
    if let Some(ext) = item.extension() {
        key.push('.');
        key.push_str(&ext);
    }

    if root.is_empty() {
        key
    } else {
        format!("{}/{}", root, key)
    }
}

#[async_trait]
impl CdnService for CdnClient {
    async fn upload(&self, item: &MediaItem) -> Result<String> {
        let key = object_key(&self.root, item);
        let content_type = detect_media_mime(&item.data, item.extension().as_deref());
        let body = ByteStream::from(item.data.clone());

        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| Error::S3(format!("Failed to upload file: {}", e)))?;

        if output.e_tag().is_none() {
            return Err(Error::S3("put object: no metadata in response".to_string()));
        }

        Ok(self.get_public_url(&key))
    }
}
