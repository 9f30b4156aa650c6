//! Pages: a unit of wiki source with a parsed block tree, a variable scope,
//! and the side effects collected while rendering (images used, categories
//! referenced, warnings).

use crate::blocks;
use crate::format::normalize_name;
use crate::html::strip_tags;
use crate::lexer::{ParseError, Parser};
use crate::opt::PageOpt;
use crate::position::Position;
use crate::scope::Scope;
use crate::tree::{BlockArena, BlockId, BlockNode};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("page has neither source nor file path")]
    NoSource,
}

/// A semantic warning collected during parse or html generation. Warnings
/// never abort a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    pub pos: Position,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.pos, self.message)
    }
}

/// Metadata extracted from a page's variables without keeping the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub draft: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub generated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fmt_title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// A single page or model, constructed from a file path or in-memory source.
///
/// `parse` populates the block tree and variable scope; `html` renders.
/// Both are idempotent on an unchanged page.
pub struct Page {
    pub source: Option<String>,
    pub file_path: Option<PathBuf>,
    /// Parse variables only; skip block evaluation.
    pub vars_only: bool,
    pub opt: PageOpt,
    pub warnings: Vec<Warning>,

    pub(crate) arena: BlockArena,
    pub(crate) model_depth: usize,
    main: Option<BlockId>,
    scope: Scope,
    images: BTreeMap<String, Vec<(u32, u32)>>,
    page_refs: BTreeMap<String, Vec<usize>>,
    models: BTreeSet<String>,
    styles: Vec<String>,
    heading_ids: HashMap<String, usize>,
    generated_html: Option<String>,
    parsed: bool,
}

impl Page {
    /// A page backed by a source file.
    pub fn new_file(path: impl Into<PathBuf>, opt: PageOpt) -> Self {
        Self::build(None, Some(path.into()), opt)
    }

    /// A page backed by in-memory source.
    pub fn from_source(source: &str, opt: PageOpt) -> Self {
        Self::build(Some(source.to_string()), None, opt)
    }

    fn build(source: Option<String>, file_path: Option<PathBuf>, opt: PageOpt) -> Self {
        Self {
            source,
            file_path,
            vars_only: false,
            opt,
            warnings: Vec::new(),
            arena: BlockArena::new(),
            model_depth: 0,
            main: None,
            scope: Scope::new(),
            images: BTreeMap::new(),
            page_refs: BTreeMap::new(),
            models: BTreeSet::new(),
            styles: Vec::new(),
            heading_ids: HashMap::new(),
            generated_html: None,
            parsed: false,
        }
    }

    /// Seed the page scope with wiki-level defaults.
    pub fn with_defaults(mut self, defaults: Scope) -> Self {
        self.scope = Scope::with_parent(defaults);
        self
    }

    /// Parse the page source into a block tree and variable scope.
    pub fn parse(&mut self) -> Result<(), PageError> {
        if self.parsed {
            return Ok(());
        }

        let source = match (&self.source, &self.file_path) {
            (Some(s), _) => s.clone(),
            (None, Some(p)) => fs::read_to_string(p)?,
            (None, None) => return Err(PageError::NoSource),
        };

        self.arena = BlockArena::new();
        let main = self
            .arena
            .push(BlockNode::new("main", None, Position::new(1, 1)));
        self.main = Some(main);

        let mut parser = Parser::new(main);
        for line in source.lines() {
            parser.parse_line(line, self)?;
        }
        parser.finish(self)?;

        if !self.vars_only {
            blocks::parse(self, main);
        }

        // pull recognised variables back into the options
        let opt_warnings = self.opt.inject_from_scope(&self.scope, &self.arena);
        for message in opt_warnings {
            self.warn(Position::default(), message);
        }

        self.parsed = true;
        Ok(())
    }

    /// Generate the page HTML. The page must be parsed first.
    pub fn html(&mut self) -> String {
        if let Some(html) = &self.generated_html {
            return html.clone();
        }
        let main = match self.main {
            Some(main) if !self.vars_only => main,
            _ => return String::new(),
        };
        let html = blocks::html(self, main).generate();
        self.generated_html = Some(html.clone());
        html
    }

    /// The flat CSS stream collected from `style{}` blocks.
    pub fn css(&self) -> String {
        self.styles.join("\n")
    }

    /// Plain text of the rendered page, for search indexing.
    pub fn search_text(&mut self) -> String {
        strip_tags(&self.html())
    }

    // ------------------------------------------------------------------
    // metadata from variables

    /// Page title with formatting tags preserved.
    pub fn fmt_title(&self) -> String {
        self.scope
            .get_str("page.title")
            .ok()
            .flatten()
            .unwrap_or_default()
            .to_string()
    }

    /// Page title with formatting tags stripped.
    pub fn title(&self) -> String {
        strip_tags(&self.fmt_title())
    }

    pub fn title_or_name(&self) -> String {
        let title = self.title();
        if title.is_empty() {
            self.name()
        } else {
            title
        }
    }

    pub fn author(&self) -> Option<String> {
        self.scope
            .get_str("page.author")
            .ok()
            .flatten()
            .map(str::to_string)
    }

    pub fn draft(&self) -> bool {
        self.scope.get_bool("page.draft").unwrap_or(false)
    }

    /// True if the page was generated from another source.
    pub fn generated(&self) -> bool {
        self.scope.get_bool("page.generated").unwrap_or(false)
    }

    /// Creation time from `page.created`: Unix seconds, then RFC 2822, then
    /// `YYYY-MM-DD`.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        let s = self.scope.get_str("page.created").ok().flatten()?;
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if let Ok(unix) = s.parse::<i64>() {
            return Utc.timestamp_opt(unix, 0).single();
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|ndt| Utc.from_utc_datetime(&ndt));
        }
        None
    }

    /// Source file modification time.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        let path = self.file_path.as_ref()?;
        let mtime = fs::metadata(path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(mtime))
    }

    /// Where the page redirects to, if anywhere: a symbolic link into the
    /// page directory wins, then `page.redirect`.
    pub fn redirect(&self) -> Option<String> {
        if self.is_symlink() {
            if let Some(name) = self.symlink_target_name() {
                return Some(format!("{}/{}", self.opt.root.page, name));
            }
        }

        let target = self.scope.get_str("page.redirect").ok().flatten()?;
        let target = target.trim();
        if target.is_empty() {
            return None;
        }
        if target.contains("://") || target.starts_with('/') {
            Some(target.to_string())
        } else {
            Some(format!("{}/{}", self.opt.root.page, normalize_name(target)))
        }
    }

    /// True if the page is a symbolic link to another file within the page
    /// directory. Links leading outside it are ordinary pages.
    pub fn is_symlink(&self) -> bool {
        let Some(path) = &self.file_path else {
            return false;
        };
        let Ok(meta) = fs::symlink_metadata(path) else {
            return false;
        };
        if !meta.file_type().is_symlink() {
            return false;
        }
        let Ok(resolved) = fs::canonicalize(path) else {
            return false;
        };
        let Ok(page_dir) = fs::canonicalize(&self.opt.dir.page) else {
            return false;
        };
        resolved.starts_with(page_dir)
    }

    fn symlink_target_name(&self) -> Option<String> {
        let path = self.file_path.as_ref()?;
        let resolved = fs::canonicalize(path).ok()?;
        let page_dir = fs::canonicalize(&self.opt.dir.page).ok()?;
        let rel = resolved.strip_prefix(&page_dir).ok()?;
        let name = rel.to_string_lossy().replace('\\', "/");
        Some(name.strip_suffix(".page").unwrap_or(&name).to_string())
    }

    /// Names of the categories this page references (`@category.x;`).
    pub fn categories(&self) -> Vec<String> {
        match self.scope.get_map("category") {
            Ok(Some(map)) => map.keys().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Metadata summary for manifests and callers that skip rendering.
    pub fn info(&self) -> PageInfo {
        PageInfo {
            created: self.created(),
            modified: self.modified(),
            draft: self.draft(),
            generated: self.generated(),
            redirect: self.redirect(),
            title: self.title(),
            fmt_title: self.fmt_title(),
            author: self.author(),
        }
    }

    // ------------------------------------------------------------------
    // names and paths

    /// The page name relative to the page directory, extension included.
    pub fn name(&self) -> String {
        match &self.file_path {
            Some(path) => {
                let rel = path
                    .strip_prefix(&self.opt.dir.page)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| {
                        path.file_name().map(PathBuf::from).unwrap_or_default()
                    });
                rel.to_string_lossy().replace('\\', "/")
            }
            None => "anonymous.page".to_string(),
        }
    }

    /// The page name with no extension.
    pub fn name_ne(&self) -> String {
        let name = self.name();
        name.strip_suffix(".page").unwrap_or(&name).to_string()
    }

    /// Directory prefix of the page name, empty for top-level pages.
    pub fn prefix(&self) -> String {
        match self.name().rsplit_once('/') {
            Some((prefix, _)) => prefix.to_string(),
            None => String::new(),
        }
    }

    pub fn exists(&self) -> bool {
        match (&self.source, &self.file_path) {
            (Some(_), _) => true,
            (None, Some(path)) => path.exists(),
            _ => false,
        }
    }

    /// Path of the rendered-page cache artifact.
    pub fn cache_path(&self) -> PathBuf {
        self.opt
            .dir
            .cache
            .join("page")
            .join(format!("{}.cache", self.name()))
    }

    /// Path of the extracted search-text artifact.
    pub fn search_path(&self) -> PathBuf {
        self.opt
            .dir
            .cache
            .join("page")
            .join(format!("{}.txt", self.name()))
    }

    // ------------------------------------------------------------------
    // collected side effects

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    pub fn warn(&mut self, pos: Position, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(pos = %pos, message = %message, "page warning");
        self.warnings.push(Warning { message, pos });
    }

    /// Record an occurrence of an image at the requested dimensions.
    pub fn record_image(&mut self, file: &str, dimensions: (u32, u32)) {
        self.images
            .entry(file.to_string())
            .or_default()
            .push(dimensions);
    }

    /// Images used by the page: basename to requested dimension pairs, in
    /// occurrence order.
    pub fn images(&self) -> &BTreeMap<String, Vec<(u32, u32)>> {
        &self.images
    }

    /// Record a link to another page at the given source line.
    pub fn record_page_ref(&mut self, name: &str, line: usize) {
        self.page_refs.entry(name.to_string()).or_default().push(line);
    }

    /// Pages this page links to, with the source lines of each link.
    pub fn page_refs(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.page_refs
    }

    pub fn record_model(&mut self, name: &str) {
        self.models.insert(name.to_string());
    }

    /// Models rendered by this page.
    pub fn models(&self) -> &BTreeSet<String> {
        &self.models
    }

    pub fn add_style(&mut self, css: &str) {
        self.styles.push(css.to_string());
    }

    /// A heading id unique within this page; collisions get `-N` appended.
    pub fn unique_heading_id(&mut self, slug: &str) -> String {
        let count = self.heading_ids.entry(slug.to_string()).or_insert(0);
        let id = if *count == 0 {
            slug.to_string()
        } else {
            format!("{}-{}", slug, count)
        };
        *count += 1;
        id
    }

    /// Merge the side effects of a rendered model page into this one.
    pub(crate) fn absorb(&mut self, model_name: &str, sub: Page) {
        for warning in sub.warnings {
            self.warnings.push(Warning {
                message: format!("model '{}': {}", model_name, warning.message),
                pos: warning.pos,
            });
        }
        for style in sub.styles {
            self.styles.push(style);
        }
        for (file, dims) in sub.images {
            self.images.entry(file).or_default().extend(dims);
        }
        for (name, lines) in sub.page_refs {
            self.page_refs.entry(name).or_default().extend(lines);
        }
        for model in sub.models {
            self.models.insert(model);
        }
    }

    /// The root block, available after parse.
    pub fn main_block(&self) -> Option<BlockId> {
        self.main
    }

    /// The block arena, available after parse.
    pub fn arena_ref(&self) -> &BlockArena {
        &self.arena
    }

    /// Whether `parse` has completed.
    pub fn parsed(&self) -> bool {
        self.parsed
    }
}

/// True for names in the reserved namespaces of the page source format.
/// [`PageOpt::inject_from_scope`] uses this to warn about reserved-looking
/// names nothing reads; everything else is free-form.
pub fn is_reserved_variable(name: &str) -> bool {
    name == "name"
        || name == "main_page"
        || name == "navigation"
        || name.starts_with("page.")
        || name.starts_with("category.")
        || name.starts_with("image.")
        || name.starts_with("root.")
        || name.starts_with("dir.")
        || name.starts_with("external.")
        || name.starts_with("host.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(source: &str) -> Page {
        let mut page = Page::from_source(source, PageOpt::default());
        page.parse().expect("parse failed");
        page
    }

    #[test]
    fn test_title_and_metadata() {
        let page = parsed("@page.title: Foo;\n@page.author: ferret;\n@page.draft;\n");
        assert_eq!(page.title(), "Foo");
        assert_eq!(page.author().as_deref(), Some("ferret"));
        assert!(page.draft());
        assert!(!page.generated());
    }

    #[test]
    fn test_formatted_title_stripped() {
        let page = parsed("@page.title: [i]Styled[/i];\n");
        assert_eq!(page.fmt_title(), "<i>Styled</i>");
        assert_eq!(page.title(), "Styled");
    }

    #[test]
    fn test_created_unix_seconds() {
        let page = parsed("@page.created: 86400;\n");
        let created = page.created().unwrap();
        assert_eq!(created.timestamp(), 86400);
    }

    #[test]
    fn test_created_rfc2822() {
        let page = parsed("%page.created: Tue, 01 Jul 2003 10:52:37 +0200;\n");
        assert!(page.created().is_some());
    }

    #[test]
    fn test_created_date_only() {
        let page = parsed("@page.created: 2024-02-01;\n");
        assert_eq!(page.created().unwrap().timestamp(), 1706745600);
    }

    #[test]
    fn test_created_invalid_is_none() {
        let page = parsed("@page.created: whenever;\n");
        assert!(page.created().is_none());
    }

    #[test]
    fn test_categories_from_variables() {
        let page = parsed("@category.news;\n@category.tech;\n");
        assert_eq!(page.categories(), vec!["news", "tech"]);
    }

    #[test]
    fn test_redirect_variable() {
        let page = parsed("@page.redirect: other page;\n");
        assert_eq!(page.redirect().as_deref(), Some("/page/other_page"));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let mut page = Page::from_source("sec [A]{ x }", PageOpt::default());
        page.parse().unwrap();
        let first = page.html();
        page.parse().unwrap();
        assert_eq!(page.html(), first);
    }

    #[test]
    fn test_vars_only_skips_blocks() {
        let mut page = Page::from_source(
            "@page.title: T;\nimage { file: a.png; width: 1; height: 1; }",
            PageOpt::default(),
        );
        page.vars_only = true;
        page.parse().unwrap();
        assert_eq!(page.title(), "T");
        assert!(page.images().is_empty());
        assert_eq!(page.html(), "");
    }

    #[test]
    fn test_unclosed_block_is_error() {
        let mut page = Page::from_source("sec {", PageOpt::default());
        let err = page.parse().unwrap_err();
        assert!(err.to_string().contains("unclosed block"));
    }

    #[test]
    fn test_closing_main_is_error() {
        let mut page = Page::from_source("}", PageOpt::default());
        let err = page.parse().unwrap_err();
        assert!(err.to_string().contains("main block"));
    }

    #[test]
    fn test_names() {
        let mut opt = PageOpt::default();
        opt.dir.page = PathBuf::from("/w/page");
        let page = Page::new_file("/w/page/sub/thing.page", opt);
        assert_eq!(page.name(), "sub/thing.page");
        assert_eq!(page.name_ne(), "sub/thing");
        assert_eq!(page.prefix(), "sub");
    }

    #[test]
    fn test_cache_paths() {
        let mut opt = PageOpt::default();
        opt.dir.page = PathBuf::from("/w/page");
        opt.dir.cache = PathBuf::from("/w/cache");
        let page = Page::new_file("/w/page/a.page", opt);
        assert_eq!(page.cache_path(), PathBuf::from("/w/cache/page/a.page.cache"));
        assert_eq!(page.search_path(), PathBuf::from("/w/cache/page/a.page.txt"));
    }

    #[test]
    fn test_reserved_variables() {
        assert!(is_reserved_variable("page.title"));
        assert!(is_reserved_variable("root.image"));
        assert!(is_reserved_variable("category.news"));
        assert!(!is_reserved_variable("var.anything"));
    }
}
