//! The category index: one JSON manifest per category under
//! `cache/category/<name>.cat`, kept consistent with page content.
//!
//! Plain categories come from `@category.x;` variables. Typed categories
//! track cross-references: `image-<file>` for images used, `page-<file>`
//! for page links, `model-<name>` for models rendered.

use crate::cache::{atomic_write, CacheError};
use chrono::{DateTime, Utc};
use fernwiki_core::PageInfo;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    #[default]
    Normal,
    Page,
    Model,
    Image,
}

/// One page recorded in a category manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    /// When this entry was recorded; compared against the page's file
    /// mtime to decide staleness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asof: Option<DateTime<Utc>>,

    #[serde(default)]
    pub info: PageInfo,

    /// Image categories: one `[w, h]` pair per occurrence on the page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<[u32; 2]>,

    /// Page categories: source lines of the references, ascending and
    /// de-duplicated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<usize>,
}

/// A category manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Category {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,

    #[serde(rename = "type", default, skip_serializing_if = "is_normal")]
    pub category_type: CategoryType,

    /// Preserved categories survive with no entries.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub preserve: bool,

    /// Entries keyed by page file name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pages: BTreeMap<String, CategoryEntry>,
}

fn is_normal(t: &CategoryType) -> bool {
    *t == CategoryType::Normal
}

impl Category {
    pub fn path(cache_dir: &Path, name: &str) -> PathBuf {
        cache_dir.join("category").join(format!("{}.cat", name))
    }

    pub fn load(cache_dir: &Path, name: &str) -> Result<Category, CacheError> {
        let content = fs::read_to_string(Self::path(cache_dir, name))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn exists(cache_dir: &Path, name: &str) -> bool {
        Self::path(cache_dir, name).exists()
    }

    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(self)?;
        atomic_write(&Self::path(cache_dir, &self.name), &bytes)?;
        Ok(())
    }
}

/// Everything a successful render observed that the index cares about.
#[derive(Debug, Clone, Default)]
pub struct PageObservations {
    /// The page's file name, used as the entry key.
    pub page_file: String,
    pub info: PageInfo,
    /// Plain category names from `@category.x;`.
    pub categories: Vec<String>,
    /// Image basename to one dimension pair per occurrence.
    pub images: BTreeMap<String, Vec<(u32, u32)>>,
    /// Linked page file name to source lines.
    pub page_refs: BTreeMap<String, Vec<usize>>,
    /// Model names rendered.
    pub models: BTreeSet<String>,
}

impl PageObservations {
    /// All manifest names this page should be recorded under, typed
    /// prefixes included.
    pub fn manifest_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.categories.clone();
        names.extend(self.images.keys().map(|f| format!("image-{}", f)));
        names.extend(self.page_refs.keys().map(|f| format!("page-{}", f)));
        names.extend(self.models.iter().map(|m| format!("model-{}", m)));
        names.sort();
        names.dedup();
        names
    }

    fn entry_for(&self, manifest: &str) -> (CategoryType, CategoryEntry) {
        let mut entry = CategoryEntry {
            asof: None,
            info: self.info.clone(),
            dimensions: Vec::new(),
            lines: Vec::new(),
        };

        if let Some(file) = manifest.strip_prefix("image-") {
            if let Some(dims) = self.images.get(file) {
                entry.dimensions = dims.iter().map(|&(w, h)| [w, h]).collect();
                return (CategoryType::Image, entry);
            }
        }
        if let Some(file) = manifest.strip_prefix("page-") {
            if let Some(lines) = self.page_refs.get(file) {
                let mut lines = lines.clone();
                lines.sort_unstable();
                lines.dedup();
                entry.lines = lines;
                return (CategoryType::Page, entry);
            }
        }
        if let Some(model) = manifest.strip_prefix("model-") {
            if self.models.contains(model) {
                return (CategoryType::Model, entry);
            }
        }
        (CategoryType::Normal, entry)
    }
}

/// Apply the index update protocol after a successful render: upsert the
/// page under every observed category, drop it from categories it left,
/// and delete manifests that became empty (unless preserved).
pub fn update_for_page(
    cache_dir: &Path,
    obs: &PageObservations,
    previous: &[String],
) -> io::Result<()> {
    let now = Utc::now();
    let current = obs.manifest_names();
    let current_set: BTreeSet<&String> = current.iter().collect();

    for name in &current {
        let (category_type, mut entry) = obs.entry_for(name);

        let mut cat = match Category::load(cache_dir, name) {
            Ok(cat) => cat,
            Err(_) => Category {
                name: name.clone(),
                created: Some(now),
                category_type,
                ..Default::default()
            },
        };
        cat.category_type = category_type;

        // unchanged entries don't bump the manifest
        if let Some(existing) = cat.pages.get(&obs.page_file) {
            if existing.info == entry.info
                && existing.dimensions == entry.dimensions
                && existing.lines == entry.lines
            {
                continue;
            }
        }

        entry.asof = Some(now);
        cat.pages.insert(obs.page_file.clone(), entry);
        cat.modified = Some(cat.modified.map_or(now, |m| m.max(now)));
        cat.save(cache_dir).map_err(io_error)?;
        tracing::debug!(category = %name, page = %obs.page_file, "category entry updated");
    }

    // categories the page no longer references
    for name in previous {
        if current_set.contains(name) {
            continue;
        }
        let mut cat = match Category::load(cache_dir, name) {
            Ok(cat) => cat,
            Err(_) => continue,
        };
        if cat.pages.remove(&obs.page_file).is_none() {
            continue;
        }
        if cat.pages.is_empty() && !cat.preserve {
            fs::remove_file(Category::path(cache_dir, name))?;
            tracing::debug!(category = %name, "empty category deleted");
        } else {
            cat.modified = Some(now);
            cat.save(cache_dir).map_err(io_error)?;
        }
    }

    Ok(())
}

fn io_error(e: CacheError) -> io::Error {
    match e {
        CacheError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(page_file: &str) -> PageObservations {
        PageObservations {
            page_file: page_file.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_manifest_names_typed() {
        let mut o = obs("a.page");
        o.categories.push("news".to_string());
        o.images.insert("foo.png".to_string(), vec![(100, 200)]);
        o.page_refs.insert("b.page".to_string(), vec![3]);
        o.models.insert("navbar".to_string());

        assert_eq!(
            o.manifest_names(),
            vec!["image-foo.png", "model-navbar", "news", "page-b.page"]
        );
    }

    #[test]
    fn test_add_and_remove_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path();

        let mut o = obs("a.page");
        o.categories.push("news".to_string());
        update_for_page(cache, &o, &[]).unwrap();

        let cat = Category::load(cache, "news").unwrap();
        assert!(cat.pages.contains_key("a.page"));
        assert!(cat.modified.is_some());
        let entry_asof = cat.pages["a.page"].asof.unwrap();
        assert!(entry_asof <= cat.modified.unwrap());

        // page stops referencing the category; empty manifest is deleted
        let o2 = obs("a.page");
        update_for_page(cache, &o2, &["news".to_string()]).unwrap();
        assert!(!Category::exists(cache, "news"));
    }

    #[test]
    fn test_preserved_category_survives_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path();

        let mut o = obs("a.page");
        o.categories.push("keep".to_string());
        update_for_page(cache, &o, &[]).unwrap();

        let mut cat = Category::load(cache, "keep").unwrap();
        cat.preserve = true;
        cat.save(cache).unwrap();

        update_for_page(cache, &obs("a.page"), &["keep".to_string()]).unwrap();
        let cat = Category::load(cache, "keep").unwrap();
        assert!(cat.pages.is_empty());
        assert!(cat.preserve);
    }

    #[test]
    fn test_image_dimensions_payload() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path();

        let mut o = obs("a.page");
        o.images
            .insert("foo.png".to_string(), vec![(100, 200), (100, 200)]);
        update_for_page(cache, &o, &[]).unwrap();

        let cat = Category::load(cache, "image-foo.png").unwrap();
        assert_eq!(cat.category_type, CategoryType::Image);
        assert_eq!(
            cat.pages["a.page"].dimensions,
            vec![[100, 200], [100, 200]]
        );
    }

    #[test]
    fn test_page_lines_sorted_deduped() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path();

        let mut o = obs("a.page");
        o.page_refs
            .insert("b.page".to_string(), vec![9, 3, 3, 7]);
        update_for_page(cache, &o, &[]).unwrap();

        let cat = Category::load(cache, "page-b.page").unwrap();
        assert_eq!(cat.category_type, CategoryType::Page);
        assert_eq!(cat.pages["a.page"].lines, vec![3, 7, 9]);
    }

    #[test]
    fn test_unchanged_entry_does_not_bump_modified() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path();

        let mut o = obs("a.page");
        o.categories.push("news".to_string());
        update_for_page(cache, &o, &[]).unwrap();
        let first = Category::load(cache, "news").unwrap().modified;

        update_for_page(cache, &o, &["news".to_string()]).unwrap();
        let second = Category::load(cache, "news").unwrap().modified;
        assert_eq!(first, second);
    }

    #[test]
    fn test_manifest_json_shape() {
        let cat = Category {
            name: "news".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&cat).unwrap();
        // omitted fields stay out of the manifest
        assert!(!json.contains("preserve"));
        assert!(!json.contains("type"));
        assert!(!json.contains("pages"));
    }
}
