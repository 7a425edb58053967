//! Rendering of upload results

use crate::models::MediaItem;
use crate::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct UploadedFile<'a> {
    path: &'a str,
    url: &'a str,
}

/// Write `items` either as a JSON array of `{path, url}` or, when `plain`,
/// as one URL per line.
pub fn write_results<W: Write>(mut writer: W, items: &[MediaItem], plain: bool) -> Result<()> {
    if plain {
        for item in items {
            writeln!(writer, "{}", item.url.as_deref().unwrap_or_default())?;
        }
    } else {
        let files: Vec<UploadedFile<'_>> = items
            .iter()
            .map(|item| UploadedFile {
                path: &item.path,
                url: item.url.as_deref().unwrap_or_default(),
            })
            .collect();
        serde_json::to_writer_pretty(&mut writer, &files)?;
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn uploaded() -> Vec<MediaItem> {
        vec![
            MediaItem::new("1.png", "pics/1.png", vec![])
                .with_url("https://cdn.test/a?x=1&y=2".to_string()),
            MediaItem::new("2.png", "pics/2.png", vec![]).with_url("https://cdn.test/b".to_string()),
        ]
    }

    #[test]
    fn test_plain_output() {
        let mut out = Vec::new();
        write_results(&mut out, &uploaded(), true).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "https://cdn.test/a?x=1&y=2\nhttps://cdn.test/b\n"
        );
    }

    #[test]
    fn test_json_output() {
        let mut out = Vec::new();
        write_results(&mut out, &uploaded(), false).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"url\": \"https://cdn.test/a?x=1&y=2\""));

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([
                {"path": "pics/1.png", "url": "https://cdn.test/a?x=1&y=2"},
                {"path": "pics/2.png", "url": "https://cdn.test/b"}
            ])
        );
    }
}
