use super::CdnService;
use crate::models::MediaItem;
use crate::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;

const DEFAULT_UPLOAD_URL: &str = "https://api.postimage.org/1/upload";

// Client identification expected by the postimage API.
const CLIENT_O: &str = "2b819584285c102318568238c7d4a4c7";
const CLIENT_M: &str = "59c2ad4b46b0c1e12d5703302bff0120";
const CLIENT_VERSION: &str = "1.0.1";
const PORTABLE: &str = "1";

/// Backend for the postimages.org image host.
pub struct PostImageClient {
    client: Client,
    api_key: String,
    upload_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    hotlink: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "data")]
struct UploadResponse {
    #[serde(rename = "@status", default)]
    status: String,
    #[serde(default)]
    links: Links,
}

impl PostImageClient {
    pub fn new(api_key: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
        }
    }

    pub fn with_upload_url(mut self, upload_url: String) -> Self {
        self.upload_url = upload_url;
        self
    }
}

/// Split a file name into stem and extension at the last dot.
fn split_name(name: &str) -> (&str, &str) {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(idx) if idx > 0 => (&base[..idx], &base[idx + 1..]),
        _ => (base, ""),
    }
}

/// Extract the direct image link from the XML upload response.
pub fn parse_response(body: &str) -> Result<String> {
    let response: UploadResponse = quick_xml::de::from_str(body)
        .map_err(|e| Error::Cdn(format!("post-image: parse response: {}", e)))?;

    if response.links.hotlink.is_empty() {
        return Err(Error::Cdn(format!(
            "post-image: no hotlink in response (status {:?})",
            response.status
        )));
    }

    Ok(response.links.hotlink)
}

#[async_trait]
impl CdnService for PostImageClient {
    async fn upload(&self, item: &MediaItem) -> Result<String> {
        let (stem, ext) = split_name(&item.name);
        let image = STANDARD.encode(&item.data);

        let form = [
            ("o", CLIENT_O),
            ("m", CLIENT_M),
            ("name", stem),
            ("type", ext),
            ("version", CLIENT_VERSION),
            ("portable", PORTABLE),
            ("key", self.api_key.as_str()),
            ("image", image.as_str()),
        ];

        let response = self
            .client
            .post(&self.upload_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to postimage: {}", e);
                e
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Cdn(format!(
                "post-image: upload failed (status {}): {}",
                status, body
            )));
        }

        parse_response(&body)
    }
}
