use super::mime::detect_media_mime;
use super::CdnService;
use crate::models::{MediaItem, TelegraphAccount};
use crate::page::{Page, PagePublisher};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://telegra.ph";
const DEFAULT_API_URL: &str = "https://api.telegra.ph";

/// Backend for the telegra.ph image host.
///
/// With an access token (see [`TelegraphClient::login`]) it also publishes
/// gallery pages through the Telegraph API.
pub struct TelegraphClient {
    client: Client,
    base_url: String,
    api_url: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    src: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UploadResponse {
    Files(Vec<UploadedFile>),
    Failure { error: String },
}

/// Envelope of every Telegraph API answer.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(Error::Cdn(format!(
                "telegraph: {} failed: {}",
                method,
                self.error.as_deref().unwrap_or("no result")
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedAccount {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    url: String,
}

impl TelegraphClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            access_token: None,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_url(mut self, api_url: String) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    /// Use the account's token, creating a new account when it has none.
    pub async fn login(mut self, account: &TelegraphAccount) -> Result<Self> {
        let token = match &account.access_token {
            Some(token) => token.clone(),
            None => {
                let token = self.create_account(account).await?;
                warn!(
                    "Created telegraph account {:?}; set TELEGRAPH_ACCESS_TOKEN={} to reuse it",
                    account.short_name(),
                    token
                );
                token
            }
        };
        self.access_token = Some(token);
        Ok(self)
    }

    async fn create_account(&self, account: &TelegraphAccount) -> Result<String> {
        let Some(short_name) = account.short_name() else {
            return Err(Error::Config(
                "telegraph: author name is required to create an account".to_string(),
            ));
        };

        let mut params = vec![("short_name", short_name)];
        if let Some(name) = account.author_name.as_deref() {
            params.push(("author_name", name));
        }
        if let Some(url) = account.author_url.as_deref() {
            params.push(("author_url", url));
        }

        let created: CreatedAccount = self.call("createAccount", &params).await?;
        Ok(created.access_token)
    }

    async fn call<T, B>(&self, method: &str, form: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.api_url, method))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Cdn(format!(
                "telegraph: {} failed (status {})",
                method, status
            )));
        }

        let answer: ApiResponse<T> = response.json().await?;
        answer.into_result(method)
    }

    fn parse_response(&self, body: &str) -> Result<String> {
        let response: UploadResponse = serde_json::from_str(body)
            .map_err(|e| Error::Cdn(format!("telegraph: unexpected response: {}", e)))?;

        match response {
            UploadResponse::Failure { error } => {
                Err(Error::Cdn(format!("telegraph: error response: {}", error)))
            }
            UploadResponse::Files(files) => match files.as_slice() {
                [file] if !file.src.is_empty() => Ok(format!("{}{}", self.base_url, file.src)),
                [_] => Err(Error::Cdn("telegraph: invalid response: src is empty".to_string())),
                other => Err(Error::Cdn(format!(
                    "telegraph: invalid response: length is {}, expected 1",
                    other.len()
                ))),
            },
        }
    }
}

#[async_trait]
impl CdnService for TelegraphClient {
    async fn upload(&self, item: &MediaItem) -> Result<String> {
        let mime = detect_media_mime(&item.data, item.extension().as_deref());
        let part = Part::bytes(item.data.clone())
            .file_name(item.name.clone())
            .mime_str(mime)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to telegraph: {}", e);
                e
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Cdn(format!(
                "telegraph: upload failed (status {}): {}",
                status, body
            )));
        }

        self.parse_response(&body)
    }
}

#[async_trait]
impl PagePublisher for TelegraphClient {
    async fn create_page(&self, page: &Page) -> Result<String> {
        let Some(access_token) = self.access_token.as_deref() else {
            return Err(Error::Config(
                "telegraph: login is required to create pages".to_string(),
            ));
        };

        // Content travels as a JSON-encoded form field.
        let content = serde_json::to_string(&page.content)?;
        let mut form = vec![
            ("access_token", access_token),
            ("title", page.title.as_str()),
            ("content", content.as_str()),
        ];
        if let Some(name) = page.author_name.as_deref() {
            form.push(("author_name", name));
        }
        if let Some(url) = page.author_url.as_deref() {
            form.push(("author_url", url));
        }
        if !page.description.is_empty() {
            form.push(("description", page.description.as_str()));
        }

        let created: CreatedPage = self.call("createPage", &form).await?;
        info!("Created telegraph page {}", created.url);
        Ok(created.url)
    }
}
