use super::CdnService;
use crate::models::MediaItem;
use crate::page::{Page, PagePublisher};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory backend returning `<base_url>/<name>` for each upload.
///
/// Also publishes pages, at `<base_url>/pages/<title>`.
#[derive(Clone)]
pub struct MockCdnClient {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    base_url: String,
    upload_count: Arc<Mutex<usize>>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    pages: Arc<Mutex<Vec<Page>>>,
}

impl MockCdnClient {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            base_url: "https://mock-cdn.example.com".to_string(),
            upload_count: Arc::new(Mutex::new(0)),
            failing: HashSet::new(),
            delays: HashMap::new(),
            pages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Make every upload of an item with this name fail.
    pub fn with_failure(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Delay uploads of an item with this name.
    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    pub fn get_upload_count(&self) -> usize {
        *self.upload_count.lock().unwrap()
    }

    pub fn get_files(&self) -> HashMap<String, Vec<u8>> {
        self.files.lock().unwrap().clone()
    }

    pub fn get_pages(&self) -> Vec<Page> {
        self.pages.lock().unwrap().clone()
    }
}

impl Default for MockCdnClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdnService for MockCdnClient {
    async fn upload(&self, item: &MediaItem) -> Result<String> {
        *self.upload_count.lock().unwrap() += 1;

        if let Some(delay) = self.delays.get(&item.name) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing.contains(&item.name) {
            return Err(Error::Cdn(format!("mock failure for {}", item.name)));
        }

        self.files
            .lock()
            .unwrap()
            .insert(item.name.clone(), item.data.clone());
        Ok(format!("{}/{}", self.base_url, item.name))
    }
}

#[async_trait]
impl PagePublisher for MockCdnClient {
    async fn create_page(&self, page: &Page) -> Result<String> {
        let slug = page.title.split_whitespace().collect::<Vec<_>>().join("-");
        self.pages.lock().unwrap().push(page.clone());
        Ok(format!("{}/pages/{}", self.base_url, slug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_cdn_upload() {
        let client = MockCdnClient::new();
        let item = MediaItem::new("test.png", "dir/test.png", b"png".to_vec());

        let url = client.upload(&item).await.unwrap();

        assert_eq!(url, "https://mock-cdn.example.com/test.png");
        assert_eq!(client.get_upload_count(), 1);
        assert_eq!(client.get_files().get("test.png"), Some(&b"png".to_vec()));
    }

    #[tokio::test]
    async fn test_mock_cdn_with_custom_base_url() {
        let client = MockCdnClient::new().with_base_url("https://custom-cdn.com".to_string());
        let item = MediaItem::new("file.txt", "file.txt", b"data".to_vec());

        let url = client.upload(&item).await.unwrap();

        assert_eq!(url, "https://custom-cdn.com/file.txt");
    }

    #[tokio::test]
    async fn test_mock_cdn_configured_failure() {
        let client = MockCdnClient::new().with_failure("bad.png");
        let item = MediaItem::new("bad.png", "bad.png", b"x".to_vec());

        let result = client.upload(&item).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("mock failure"));
        assert_eq!(client.get_upload_count(), 1);
        assert!(client.get_files().is_empty());
    }

    #[tokio::test]
    async fn test_mock_publishes_pages() {
        let client = MockCdnClient::new();
        let page = Page::gallery("My trip", None, None, ["u1"]);

        let url = client.create_page(&page).await.unwrap();

        assert_eq!(url, "https://mock-cdn.example.com/pages/My-trip");
        assert_eq!(client.get_pages(), vec![page]);
    }
}
