//! Loading local media files into upload batches
//!
//! Files named on the command line are loaded as-is; directories are
//! expanded to the images they contain, in natural order.

use crate::models::MediaItem;
use crate::{Error, Result};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Read a single file into a [`MediaItem`].
pub async fn load_media(path: &Path) -> Result<MediaItem> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    let data = tokio::fs::read(path).await.map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(MediaItem::new(name, path.to_string_lossy(), data))
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand files and directories into an ordered batch.
///
/// Directory entries that are not images are skipped.
pub async fn collect_media(paths: &[PathBuf]) -> Result<Vec<MediaItem>> {
    let mut items = Vec::with_capacity(paths.len());

    for path in paths {
        let metadata = tokio::fs::metadata(path).await.map_err(|source| Error::Read {
            path: path.clone(),
            source,
        })?;

        if !metadata.is_dir() {
            items.push(load_media(path).await?);
            continue;
        }

        for entry in list_images(path).await? {
            items.push(load_media(&entry).await?);
        }
    }

    debug!("Collected {} media files", items.len());
    Ok(items)
}

async fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_err = |source| Error::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;
    let mut images = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let file_type = entry.file_type().await.map_err(read_err)?;
        let path = entry.path();
        if file_type.is_file() && is_image(&path) {
            images.push(path);
        }
    }

    images.sort_by(|a, b| {
        natural_cmp(
            &a.file_name().unwrap_or_default().to_string_lossy(),
            &b.file_name().unwrap_or_default().to_string_lossy(),
        )
    });
    Ok(images)
}

/// Compare strings so that embedded numbers sort by value: `2.png` < `10.png`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let (a_num, next_i) = digit_run(a, i);
            let (b_num, next_j) = digit_run(b, j);

            // Longer significant run means a larger number.
            let ord = a_num
                .len()
                .cmp(&b_num.len())
                .then_with(|| a_num.cmp(b_num));
            if ord != Ordering::Equal {
                return ord;
            }
            i = next_i;
            j = next_j;
            continue;
        }

        match a[i].cmp(&b[j]) {
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
            ord => return ord,
        }
    }

    (a.len() - i).cmp(&(b.len() - j))
}

/// Digits starting at `start` with leading zeros stripped, plus the index past the run.
fn digit_run(s: &[u8], start: usize) -> (&[u8], usize) {
    let mut end = start;
    while end < s.len() && s[end].is_ascii_digit() {
        end += 1;
    }
    let mut first = start;
    while first + 1 < end && s[first] == b'0' {
        first += 1;
    }
    (&s[first..end], end)
}
