//! The wiki facade: resolves display requests to rendered artifacts,
//! maintaining the page cache and category index along the way.

use crate::cache::{self, CachedPage};
use crate::category::{self, Category, PageObservations};
use crate::display::{
    mime_type, DisplayCategoryPosts, DisplayError, DisplayImage, DisplayPage, DisplayRedirect,
    DisplayResult,
};
use crate::image::{generate_scaled, ImageError, SizedImage};
use crate::singleflight::SingleFlight;
use chrono::{DateTime, Utc};
use fernwiki_core::{normalize_name, Page, PageError, PageInfo, PageOpt, Scope};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum WikiError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("wiki.conf: {0}")]
    Conf(#[from] PageError),

    #[error("no wiki.conf under {0}")]
    MissingConf(PathBuf),
}

/// A loaded wiki: options from `wiki.conf`, the default variable scope
/// pages inherit, and the per-wiki caches and locks.
pub struct Wiki {
    opt: PageOpt,
    defaults: Scope,
    private: Option<Scope>,
    /// Serialises cache writes and category-index mutations.
    write_lock: Mutex<()>,
    flights: SingleFlight,
}

impl Wiki {
    /// Open a wiki rooted at `dir` by parsing its `wiki.conf` (wiki source,
    /// variables only). `private.conf` is loaded when present; its values
    /// only feed external collaborators.
    pub fn open(dir: impl AsRef<Path>) -> Result<Wiki, WikiError> {
        let dir = dir.as_ref();
        let conf_path = dir.join("wiki.conf");
        if !conf_path.exists() {
            return Err(WikiError::MissingConf(conf_path));
        }

        let mut conf = Page::new_file(&conf_path, PageOpt::default());
        conf.vars_only = true;
        conf.parse()?;
        for warning in &conf.warnings {
            tracing::warn!(conf = %conf_path.display(), %warning, "wiki.conf warning");
        }

        let mut opt = conf.opt.clone();
        opt.resolve_dirs(dir);
        let defaults = conf.scope().clone();

        let private_path = dir.join("private.conf");
        let private = if private_path.exists() {
            let mut private_conf = Page::new_file(&private_path, PageOpt::default());
            private_conf.vars_only = true;
            private_conf.parse()?;
            Some(private_conf.scope().clone())
        } else {
            None
        };

        tracing::info!(name = %opt.name, dir = %dir.display(), "opened wiki");
        Ok(Wiki {
            opt,
            defaults,
            private,
            write_lock: Mutex::new(()),
            flights: SingleFlight::new(),
        })
    }

    pub fn opt(&self) -> &PageOpt {
        &self.opt
    }

    /// Secrets from `private.conf`, for external collaborators only.
    pub fn private_scope(&self) -> Option<&Scope> {
        self.private.as_ref()
    }

    /// A page configured against this wiki's options and default scope.
    pub fn new_page(&self, name: &str) -> Page {
        let file = self.opt.dir.page.join(page_file_name(name));
        Page::new_file(file, self.opt.clone()).with_defaults(self.defaults.clone())
    }

    /// Page metadata without rendering: variables are parsed, block
    /// evaluation is skipped.
    pub fn page_info(&self, name: &str) -> Result<PageInfo, PageError> {
        let mut page = self.new_page(name);
        page.vars_only = true;
        page.parse()?;
        Ok(page.info())
    }

    // ------------------------------------------------------------------
    // pages

    pub fn display_page(&self, name: &str) -> DisplayResult {
        self.display_page_opts(name, false)
    }

    pub fn display_page_draft_ok(&self, name: &str) -> DisplayResult {
        self.display_page_opts(name, true)
    }

    pub fn display_page_opts(&self, name: &str, draft_ok: bool) -> DisplayResult {
        let Some(name) = safe_page_name(name) else {
            return DisplayError::not_found("page does not exist", format!("bad name '{}'", name));
        };

        let page = self.build_page(&name);
        if !page.exists() {
            return DisplayError::not_found(
                "page does not exist",
                format!("no source at {}", page.file_path.as_deref().unwrap_or(Path::new("?")).display()),
            );
        }

        // symbolic links into the page directory redirect to their target
        if page.is_symlink() {
            if let Some(redirect) = page.redirect() {
                return DisplayResult::Redirect(DisplayRedirect { redirect });
            }
        }

        // fast path outside the flight
        if let Some(result) = self.try_cached_page(&page, draft_ok) {
            return result;
        }

        let mtime = page
            .modified()
            .map(|t| t.timestamp_millis())
            .unwrap_or_default();
        let fingerprint = format!("{}:{}", name, mtime);

        self.flights.run(&fingerprint, || {
            // a racing caller may have filled the cache already
            let page = self.build_page(&name);
            if let Some(result) = self.try_cached_page(&page, draft_ok) {
                return result;
            }
            self.render_page(page, &name, draft_ok)
        })
    }

    /// Serve from the cache artifact when it is at least as new as the
    /// source and every model it rendered.
    fn try_cached_page(&self, page: &Page, draft_ok: bool) -> Option<DisplayResult> {
        let cache_path = page.cache_path();
        let cache_mtime = cache::mtime(&cache_path)?;
        let source_mtime = cache::mtime(page.file_path.as_deref()?)?;
        if cache_mtime < source_mtime {
            return None;
        }

        // an unreadable cache falls through to regeneration
        let (meta, html) = cache::read_page_cache(&cache_path).ok()?;

        for model in &meta.models {
            let model_path = self.opt.dir.model.join(format!("{}.model", model));
            if let Some(model_mtime) = cache::mtime(&model_path) {
                if model_mtime > cache_mtime {
                    return None;
                }
            }
        }

        if meta.info.draft && !draft_ok {
            return Some(DisplayError::draft(format!(
                "{} is marked as draft",
                page.name()
            )));
        }
        if let Some(redirect) = &meta.info.redirect {
            return Some(DisplayResult::Redirect(DisplayRedirect {
                redirect: redirect.clone(),
            }));
        }

        Some(DisplayResult::Page(DisplayPage {
            path: cache_path,
            mime: mime_type("html"),
            length: html.len() as u64,
            modified: Some(cache_mtime),
            from_cache: true,
            generated: false,
            cache_generated: false,
            name: page.name(),
            html,
            css: meta.css,
            info: meta.info,
            warnings: meta.warnings,
            categories: meta.categories,
        }))
    }

    /// Evaluate the page, write both cache artifacts, and apply the
    /// category-index updates. A failed render never mutates the index.
    fn render_page(&self, mut page: Page, name: &str, draft_ok: bool) -> DisplayResult {
        if let Err(e) = page.parse() {
            return match e {
                PageError::Parse(parse) => {
                    DisplayError::parse("page failed to parse", parse.to_string())
                }
                other => DisplayError::internal("page could not be read", other.to_string()),
            };
        }

        if page.draft() && !draft_ok {
            return DisplayError::draft(format!("{} is marked as draft", name));
        }
        if let Some(redirect) = page.redirect() {
            return DisplayResult::Redirect(DisplayRedirect { redirect });
        }

        let html = page.html();
        let search = page.search_text();
        let info = page.info();

        let obs = PageObservations {
            page_file: page.name(),
            info: info.clone(),
            categories: page.categories(),
            images: page.images().clone(),
            page_refs: page.page_refs().clone(),
            models: page.models().clone(),
        };
        let manifest_names = obs.manifest_names();

        let meta = CachedPage {
            info: info.clone(),
            warnings: page.warnings.clone(),
            categories: manifest_names.clone(),
            models: page.models().iter().cloned().collect(),
            css: page.css(),
        };

        let cache_path = page.cache_path();
        {
            let _guard = self.write_lock.lock();

            // the previously recorded membership drives removals
            let previous = cache::read_page_cache(&cache_path)
                .map(|(old, _)| old.categories)
                .unwrap_or_default();

            if let Err(e) = cache::write_page_cache(&cache_path, &meta, &html) {
                return DisplayError::internal("could not write cache", e.to_string());
            }
            if let Err(e) = cache::write_search_text(&page.search_path(), &search) {
                tracing::warn!(page = %name, error = %e, "could not write search text");
            }
            if let Err(e) = category::update_for_page(&self.opt.dir.cache, &obs, &previous) {
                tracing::warn!(page = %name, error = %e, "category index update failed");
            }
        }

        self.pregenerate_page_images(&page);

        tracing::info!(page = %name, warnings = page.warnings.len(), "rendered page");
        DisplayResult::Page(DisplayPage {
            path: cache_path.clone(),
            mime: mime_type("html"),
            length: html.len() as u64,
            modified: cache::mtime(&cache_path),
            from_cache: false,
            generated: true,
            cache_generated: true,
            name: page.name(),
            html,
            css: meta.css,
            info,
            warnings: page.warnings.clone(),
            categories: manifest_names,
        })
    }

    fn build_page(&self, name: &str) -> Page {
        let file = self.opt.dir.page.join(name);
        Page::new_file(file, self.opt.clone()).with_defaults(self.defaults.clone())
    }

    // ------------------------------------------------------------------
    // images

    /// Serve a full-size image straight from the image directory.
    pub fn display_image(&self, name: &str) -> DisplayResult {
        if !safe_file_name(name) {
            return DisplayError::not_found("image does not exist", format!("bad name '{}'", name));
        }
        let path = self.opt.dir.image.join(name);
        let Ok(meta) = fs::metadata(&path) else {
            return DisplayError::not_found(
                "image does not exist",
                format!("no image at {}", path.display()),
            );
        };
        let ext = extension_of(name);
        DisplayResult::Image(DisplayImage {
            mime: mime_type(&ext),
            length: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            path,
            from_cache: false,
            generated: false,
            cache_generated: false,
        })
    }

    /// Serve a scaled image, generating the variant if allowed and stale.
    pub fn display_sized_image(&self, sized: SizedImage, generate_ok: bool) -> DisplayResult {
        let mut sized = sized;
        if !safe_file_name(&sized.base_name()) {
            return DisplayError::not_found("image does not exist", "bad name".to_string());
        }

        let source = self.opt.dir.image.join(sized.base_name());
        let Some(source_mtime) = cache::mtime(&source) else {
            return DisplayError::not_found(
                "image does not exist",
                format!("no image at {}", source.display()),
            );
        };

        if sized.is_full_size() {
            return self.display_image(&sized.base_name());
        }

        if let Err(e) = sized.normalize_scale(&self.opt.image.retina, generate_ok) {
            return DisplayError::not_found("image variant not available", e.to_string());
        }

        let dest = self.opt.dir.cache.join("image").join(sized.scale_name());
        let fresh = cache::mtime(&dest).is_some_and(|d| d >= source_mtime);

        if !fresh {
            if !generate_ok {
                return DisplayError::not_found(
                    "image variant not available",
                    format!("{} is not pregenerated", sized.scale_name()),
                );
            }
            if let Err(e) = self.generate_variant(&source, &dest, &sized) {
                return DisplayError::internal("image generation failed", e.to_string());
            }
        }

        let Ok(meta) = fs::metadata(&dest) else {
            return DisplayError::internal("image generation failed", dest.display().to_string());
        };
        DisplayResult::Image(DisplayImage {
            mime: mime_type(&sized.ext),
            length: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            path: dest,
            from_cache: fresh,
            generated: !fresh,
            cache_generated: !fresh,
        })
    }

    /// Parse a request name and serve the scaled image it describes.
    pub fn display_sized_image_name(&self, name: &str, generate_ok: bool) -> DisplayResult {
        match SizedImage::from_name(name) {
            Ok(sized) => self.display_sized_image(sized, generate_ok),
            Err(e) => DisplayError::not_found("image does not exist", e.to_string()),
        }
    }

    fn generate_variant(
        &self,
        source: &Path,
        dest: &Path,
        sized: &SizedImage,
    ) -> Result<(), ImageError> {
        let _guard = self.write_lock.lock();
        // racing caller may have produced it while we waited
        if let (Some(d), Some(s)) = (cache::mtime(dest), cache::mtime(source)) {
            if d >= s {
                return Ok(());
            }
        }
        generate_scaled(source, dest, sized)
    }

    /// The largest allowed retina scale is always pre-generated for images
    /// referenced on a rendered page.
    fn pregenerate_page_images(&self, page: &Page) {
        let max_scale = self.opt.image.max_scale();
        for (file, dims) in page.images() {
            for &(width, height) in dims {
                if width == 0 && height == 0 {
                    continue;
                }
                let Ok(mut sized) = SizedImage::from_name(file) else {
                    continue;
                };
                sized.width = width;
                sized.height = height;
                sized.scale = max_scale;

                let source = self.opt.dir.image.join(sized.base_name());
                if cache::mtime(&source).is_none() {
                    continue; // the page already warned about it
                }
                let dest = self.opt.dir.cache.join("image").join(sized.scale_name());
                if let Err(e) = self.generate_variant(&source, &dest, &sized) {
                    tracing::warn!(image = %file, error = %e, "image pregeneration failed");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // categories

    /// A paginated view of a category's pages, rendered cache-permitting
    /// and ordered by page creation time descending.
    pub fn display_category_posts(&self, name: &str, page_n: usize) -> DisplayResult {
        let Ok(category) = Category::load(&self.opt.dir.cache, name) else {
            return DisplayError::not_found(
                "category does not exist",
                format!("no manifest for '{}'", name),
            );
        };

        let mut pages = Vec::new();
        for page_file in category.pages.keys().cloned().collect::<Vec<_>>() {
            match self.display_page_opts(&page_file, false) {
                DisplayResult::Page(p) => pages.push(p),
                // drafts, redirects, and missing pages fall out of listings
                _ => {}
            }
        }

        pages.sort_by(|a, b| {
            let a_created = a.info.created.unwrap_or(DateTime::<Utc>::MIN_UTC);
            let b_created = b.info.created.unwrap_or(DateTime::<Utc>::MIN_UTC);
            b_created
                .cmp(&a_created)
                .then_with(|| a.name.cmp(&b.name))
        });

        let per_page = self.opt.category_per_page.max(1);
        let num_pages = (pages.len() + per_page - 1) / per_page;
        let selected: Vec<DisplayPage> = pages
            .into_iter()
            .skip(page_n * per_page)
            .take(per_page)
            .collect();

        let mut css = String::new();
        for page in &selected {
            if !page.css.is_empty() {
                css.push_str(&page.css);
                css.push('\n');
            }
        }

        DisplayResult::CategoryPosts(DisplayCategoryPosts {
            name: name.to_string(),
            title: category.title.clone(),
            pages: selected,
            page_n,
            num_pages,
            css,
        })
    }

    // ------------------------------------------------------------------
    // pregeneration

    /// Fill every cache: render all pages (models and referenced images
    /// come along), then warm all category listings.
    pub fn pregenerate(&self) -> Vec<(String, DisplayResult)> {
        let mut results = Vec::new();

        for entry in WalkDir::new(&self.opt.dir.page)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("page") {
                continue;
            }
            let name = entry
                .path()
                .strip_prefix(&self.opt.dir.page)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            // draft_ok so draft pages land in the cache too; plain display
            // still refuses to serve them
            results.push((name.clone(), self.display_page_draft_ok(&name)));
        }

        let category_dir = self.opt.dir.cache.join("category");
        for entry in WalkDir::new(&category_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("cat") {
                continue;
            }
            let name = entry
                .path()
                .strip_prefix(&category_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let name = name.strip_suffix(".cat").unwrap_or(&name).to_string();
            results.push((
                format!("category:{}", name),
                self.display_category_posts(&name, 0),
            ));
        }

        tracing::info!(count = results.len(), "pregeneration complete");
        results
    }
}

/// Normalize a request into a page file name, rejecting path escapes.
fn safe_page_name(name: &str) -> Option<String> {
    let file = page_file_name(name);
    if file.is_empty() || !safe_file_name(&file) {
        return None;
    }
    Some(file)
}

fn page_file_name(name: &str) -> String {
    let base = normalize_name(name);
    if base.is_empty() {
        return String::new();
    }
    format!("{}.page", base)
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string()
}

/// True when every path segment is an ordinary name.
fn safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name).components().all(|c| {
            matches!(c, std::path::Component::Normal(seg) if seg.to_str().map(|s| s != "..").unwrap_or(false))
        })
}
