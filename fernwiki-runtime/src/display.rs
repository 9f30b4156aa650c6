//! Display results: the discriminated union returned by every `Wiki`
//! display operation. Callers dispatch on the variant tag.

use chrono::{DateTime, Utc};
use fernwiki_core::{PageInfo, Warning};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a display operation.
#[derive(Debug, Clone)]
pub enum DisplayResult {
    Page(DisplayPage),
    Image(DisplayImage),
    Redirect(DisplayRedirect),
    CategoryPosts(DisplayCategoryPosts),
    Error(DisplayError),
}

impl DisplayResult {
    /// Mark the result as served from cache, used when a caller observes an
    /// in-flight render instead of performing its own.
    pub(crate) fn mark_from_cache(mut self) -> Self {
        match &mut self {
            DisplayResult::Page(p) => p.from_cache = true,
            DisplayResult::Image(i) => i.from_cache = true,
            _ => {}
        }
        self
    }
}

/// A rendered page, from cache or freshly generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayPage {
    /// Path of the cache artifact on disk.
    pub path: PathBuf,
    pub mime: String,
    pub length: u64,
    pub modified: Option<DateTime<Utc>>,
    pub from_cache: bool,
    pub generated: bool,
    pub cache_generated: bool,

    pub name: String,
    pub html: String,
    pub css: String,
    pub info: PageInfo,
    pub warnings: Vec<Warning>,
    pub categories: Vec<String>,
}

/// A full-size or scaled image served from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayImage {
    pub path: PathBuf,
    pub mime: String,
    pub length: u64,
    pub modified: Option<DateTime<Utc>>,
    pub from_cache: bool,
    pub generated: bool,
    pub cache_generated: bool,
}

/// A page redirect; not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayRedirect {
    pub redirect: String,
}

/// A paginated category listing.
#[derive(Debug, Clone)]
pub struct DisplayCategoryPosts {
    pub name: String,
    pub title: Option<String>,
    /// Rendered pages of this result page, ordered created-descending.
    pub pages: Vec<DisplayPage>,
    /// Zero-based result page number.
    pub page_n: usize,
    pub num_pages: usize,
    /// Combined CSS of the listed pages.
    pub css: String,
}

/// An error safe to show; sensitive paths go in `detailed_error` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayError {
    pub error: String,
    pub detailed_error: String,
    pub status: u16,
    pub parse_error: bool,
    pub draft: bool,
}

impl DisplayError {
    pub fn not_found(error: &str, detailed: impl Into<String>) -> DisplayResult {
        DisplayResult::Error(DisplayError {
            error: error.to_string(),
            detailed_error: detailed.into(),
            status: 404,
            parse_error: false,
            draft: false,
        })
    }

    pub fn parse(error: &str, detailed: impl Into<String>) -> DisplayResult {
        DisplayResult::Error(DisplayError {
            error: error.to_string(),
            detailed_error: detailed.into(),
            status: 500,
            parse_error: true,
            draft: false,
        })
    }

    pub fn internal(error: &str, detailed: impl Into<String>) -> DisplayResult {
        DisplayResult::Error(DisplayError {
            error: error.to_string(),
            detailed_error: detailed.into(),
            status: 500,
            parse_error: false,
            draft: false,
        })
    }

    pub fn draft(detailed: impl Into<String>) -> DisplayResult {
        DisplayResult::Error(DisplayError {
            error: "page does not exist".to_string(),
            detailed_error: detailed.into(),
            status: 404,
            parse_error: false,
            draft: true,
        })
    }
}

/// Mime type for a file extension, defaulting to octet-stream.
pub fn mime_type(ext: &str) -> String {
    match ext.to_ascii_lowercase().as_str() {
        "html" => "text/html",
        "txt" => "text/plain",
        "css" => "text/css",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type("png"), "image/png");
        assert_eq!(mime_type("JPG"), "image/jpeg");
        assert_eq!(mime_type("bin"), "application/octet-stream");
    }

    #[test]
    fn test_draft_error_is_hidden_not_found() {
        let result = DisplayError::draft("page x is a draft");
        match result {
            DisplayResult::Error(e) => {
                assert_eq!(e.status, 404);
                assert!(e.draft);
                assert!(!e.error.contains("draft"), "safe message must not leak");
            }
            _ => panic!("expected error variant"),
        }
    }
}
