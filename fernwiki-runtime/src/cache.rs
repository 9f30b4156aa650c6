//! On-disk page cache artifacts.
//!
//! For each page, `cache/page/<name>.cache` holds a JSON metadata line
//! followed by the rendered HTML, and `cache/page/<name>.txt` holds the
//! extracted search text. All writes are atomic (sibling temp + rename).

use chrono::{DateTime, Utc};
use fernwiki_core::{PageInfo, Warning};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("bad cache metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("cache file is empty")]
    Empty,
}

/// Sidecar metadata stored on the first line of a `.cache` artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedPage {
    #[serde(default)]
    pub info: PageInfo,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,

    /// Full category manifest names the page was recorded under, typed
    /// prefixes included. Drives removal diffs on the next render.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    /// Models rendered into the page; their files count as includes for
    /// cache freshness.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub css: String,
}

/// Modification time of a path, if it exists.
pub fn mtime(path: &Path) -> Option<DateTime<Utc>> {
    let meta = fs::metadata(path).ok()?;
    let mtime = meta.modified().ok()?;
    Some(DateTime::<Utc>::from(mtime))
}

/// Write bytes atomically: sibling temp file, then rename into place.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// Temp path next to `path` so the rename stays on one filesystem.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".tmp-{}", file_name))
}

/// Write the `.cache` artifact: metadata line, newline, HTML.
pub fn write_page_cache(path: &Path, meta: &CachedPage, html: &str) -> Result<(), CacheError> {
    let mut bytes = serde_json::to_vec(meta)?;
    bytes.push(b'\n');
    bytes.extend_from_slice(html.as_bytes());
    atomic_write(path, &bytes)?;
    tracing::debug!(path = %path.display(), "wrote page cache");
    Ok(())
}

/// Read a `.cache` artifact back into metadata and HTML.
pub fn read_page_cache(path: &Path) -> Result<(CachedPage, String), CacheError> {
    let content = fs::read_to_string(path)?;
    let (first, rest) = content.split_once('\n').ok_or(CacheError::Empty)?;
    let meta: CachedPage = serde_json::from_str(first)?;
    Ok((meta, rest.to_string()))
}

/// Write the `.txt` search-text artifact.
pub fn write_search_text(path: &Path, text: &str) -> Result<(), CacheError> {
    atomic_write(path, text.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("page/a.page.cache");

        let meta = CachedPage {
            info: PageInfo {
                title: "A".to_string(),
                ..Default::default()
            },
            categories: vec!["news".to_string()],
            ..Default::default()
        };
        write_page_cache(&path, &meta, "<p>body</p>\nmore").unwrap();

        let (read, html) = read_page_cache(&path).unwrap();
        assert_eq!(read.info.title, "A");
        assert_eq!(read.categories, vec!["news"]);
        assert_eq!(html, "<p>body</p>\nmore");
    }

    #[test]
    fn test_atomic_write_replaces() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.txt");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        // no temp files left behind
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_missing_cache_errors() {
        assert!(read_page_cache(Path::new("/nonexistent/x.cache")).is_err());
    }
}
