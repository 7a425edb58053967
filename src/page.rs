//! Gallery pages
//!
//! A post is a page whose content is one `img` node per uploaded file, in
//! upload order. [`PagePublisher`] is the seam to whatever hosts the page;
//! the Telegraph backend is the real one.

use crate::models::MediaItem;
use crate::uploader::Uploader;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A node of page content: plain text or an element with children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub tag: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn image(src: impl Into<String>) -> Self {
        Self::Element(Element {
            tag: "img".to_string(),
            attrs: BTreeMap::from([("src".to_string(), src.into())]),
            children: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub title: String,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub description: String,
    pub content: Vec<Node>,
}

impl Page {
    /// One image per URL, in order. Blank author fields are left unset.
    pub fn gallery<I, S>(
        title: impl Into<String>,
        author_name: Option<&str>,
        author_url: Option<&str>,
        urls: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            author_name: non_blank(author_name),
            author_url: non_blank(author_url),
            description: String::new(),
            content: urls.into_iter().map(Node::image).collect(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).map(str::to_string)
}

#[async_trait]
pub trait PagePublisher: Send + Sync {
    /// Publish `page` and return its public URL.
    async fn create_page(&self, page: &Page) -> Result<String>;
}

/// What to put around the uploaded images.
#[derive(Debug, Clone, Default)]
pub struct PostRequest {
    pub title: String,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
}

/// Upload `items` and publish them as a gallery page.
///
/// Nothing is published unless every item uploaded.
pub async fn post_gallery(
    uploader: &Uploader,
    publisher: &dyn PagePublisher,
    request: &PostRequest,
    items: Vec<MediaItem>,
    cancel: &CancellationToken,
) -> Result<String> {
    if request.title.trim().is_empty() {
        return Err(Error::Config("page title is required".to_string()));
    }
    if items.is_empty() {
        return Err(Error::Config("no images to post".to_string()));
    }

    let uploaded = uploader.upload(items, cancel).await?;
    let urls = uploaded.into_iter().filter_map(|item| item.url);

    let page = Page::gallery(
        request.title.as_str(),
        request.author_name.as_deref(),
        request.author_url.as_deref(),
        urls,
    );
    let url = publisher.create_page(&page).await?;

    info!("Article posted: {}", url);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdn::MockCdnClient;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn items(names: &[&str]) -> Vec<MediaItem> {
        names
            .iter()
            .map(|name| MediaItem::new(*name, format!("pics/{}", name), name.as_bytes().to_vec()))
            .collect()
    }

    fn request(title: &str) -> PostRequest {
        PostRequest {
            title: title.to_string(),
            author_name: Some("Ann".to_string()),
            author_url: None,
        }
    }

    #[test]
    fn test_gallery_page_has_one_image_per_url() {
        let page = Page::gallery("Trip", Some("Ann"), Some("  "), ["u1", "u2"]);

        assert_eq!(page.title, "Trip");
        assert_eq!(page.author_name.as_deref(), Some("Ann"));
        assert_eq!(page.author_url, None);
        assert_eq!(page.content, vec![Node::image("u1"), Node::image("u2")]);
    }

    #[test]
    fn test_nodes_serialize_like_telegraph_content() {
        let content = vec![
            Node::image("https://x/1.png"),
            Node::Element(Element {
                tag: "p".to_string(),
                attrs: BTreeMap::new(),
                children: vec![Node::Text("caption".to_string())],
            }),
        ];

        assert_eq!(
            serde_json::to_value(&content).unwrap(),
            serde_json::json!([
                {"tag": "img", "attrs": {"src": "https://x/1.png"}},
                {"tag": "p", "children": ["caption"]}
            ])
        );
    }

    #[tokio::test]
    async fn test_post_gallery_publishes_images_in_order() {
        let cdn = MockCdnClient::new()
            .with_base_url("https://cdn.test".to_string())
            .with_delay("1.png", std::time::Duration::from_millis(30));
        let uploader = Uploader::new(Arc::new(cdn.clone()), 4).unwrap();

        let url = post_gallery(
            &uploader,
            &cdn,
            &request("Trip"),
            items(&["1.png", "2.png"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(url, "https://cdn.test/pages/Trip");
        let pages = cdn.get_pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(
            pages[0].content,
            vec![
                Node::image("https://cdn.test/1.png"),
                Node::image("https://cdn.test/2.png")
            ]
        );
        assert_eq!(pages[0].author_name.as_deref(), Some("Ann"));
    }

    #[tokio::test]
    async fn test_failed_upload_publishes_nothing() {
        let cdn = MockCdnClient::new().with_failure("2.png");
        let uploader = Uploader::new(Arc::new(cdn.clone()), 2).unwrap();

        let err = post_gallery(
            &uploader,
            &cdn,
            &request("Trip"),
            items(&["1.png", "2.png"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.failed_names(), vec!["2.png"]);
        assert!(cdn.get_pages().is_empty());
    }

    #[tokio::test]
    async fn test_post_requires_title_and_images() {
        let cdn = MockCdnClient::new();
        let uploader = Uploader::new(Arc::new(cdn.clone()), 2).unwrap();
        let cancel = CancellationToken::new();

        let err = post_gallery(&uploader, &cdn, &request(" "), items(&["a"]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = post_gallery(&uploader, &cdn, &request("Trip"), Vec::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert_eq!(cdn.get_upload_count(), 0);
    }
}
