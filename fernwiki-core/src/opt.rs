//! Page options: directory layout, public roots, retina policy, navigation,
//! and external wiki tables.
//!
//! The same struct backs both page rendering and `wiki.conf` loading: the
//! conf file is wiki source, parsed variables-only, and injected here.

use crate::blocks::{BlockData, MapValue};
use crate::page::is_reserved_variable;
use crate::scope::{Scope, Value};
use crate::tree::BlockArena;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Filesystem layout under the wiki root.
#[derive(Debug, Clone)]
pub struct DirOpt {
    pub wiki: PathBuf,
    pub page: PathBuf,
    pub image: PathBuf,
    pub model: PathBuf,
    pub cache: PathBuf,
}

/// Public URL roots.
#[derive(Debug, Clone)]
pub struct RootOpt {
    pub wiki: String,
    pub page: String,
    pub image: String,
    pub category: String,
    pub file: String,
}

/// Image pipeline policy.
#[derive(Debug, Clone, Default)]
pub struct ImageOpt {
    /// Allowed retina scales, e.g. `[2, 3]`. Empty means scale 1 only.
    pub retina: Vec<u32>,
}

impl ImageOpt {
    /// The largest allowed scale; 1 when no retina scales are configured.
    pub fn max_scale(&self) -> u32 {
        self.retina.iter().copied().max().unwrap_or(1).max(1)
    }
}

/// How an external wiki escapes article names in URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExternalType {
    /// Spaces become underscores (`mediawiki`).
    MediaWiki,
    /// Spaces are percent-encoded.
    #[default]
    Plain,
}

impl ExternalType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "mediawiki" => ExternalType::MediaWiki,
            _ => ExternalType::Plain,
        }
    }
}

/// One `external.<key>` table entry.
#[derive(Debug, Clone)]
pub struct ExternalWiki {
    pub name: String,
    pub root: String,
    pub kind: ExternalType,
}

/// One `navigation` entry, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavItem {
    pub label: String,
    pub href: String,
}

/// Options governing page parsing and rendering.
#[derive(Debug, Clone)]
pub struct PageOpt {
    /// Wiki name.
    pub name: String,
    /// Page served at the wiki root.
    pub main_page: String,
    pub dir: DirOpt,
    pub root: RootOpt,
    pub image: ImageOpt,
    pub external: HashMap<String, ExternalWiki>,
    pub navigation: Vec<NavItem>,
    /// Allows `html{}` blocks and `[html:…]` passthrough.
    pub unsafe_html: bool,
    /// Results per page in category post listings.
    pub category_per_page: usize,
}

impl Default for PageOpt {
    fn default() -> Self {
        Self {
            name: String::new(),
            main_page: "main".to_string(),
            dir: DirOpt {
                wiki: PathBuf::from("."),
                page: PathBuf::from("page"),
                image: PathBuf::from("image"),
                model: PathBuf::from("model"),
                cache: PathBuf::from("cache"),
            },
            root: RootOpt {
                wiki: String::new(),
                page: "/page".to_string(),
                image: "/image".to_string(),
                category: "/topic".to_string(),
                file: "/file".to_string(),
            },
            image: ImageOpt::default(),
            external: HashMap::new(),
            navigation: Vec::new(),
            unsafe_html: false,
            category_per_page: 10,
        }
    }
}

impl PageOpt {
    /// Re-root relative directories under the given wiki base directory.
    pub fn resolve_dirs(&mut self, base: &Path) {
        self.dir.wiki = resolve(base, &self.dir.wiki);
        self.dir.page = resolve(base, &self.dir.page);
        self.dir.image = resolve(base, &self.dir.image);
        self.dir.model = resolve(base, &self.dir.model);
        self.dir.cache = resolve(base, &self.dir.cache);
    }

    /// Pull recognised variables out of a parsed scope into this struct.
    ///
    /// Returns human-readable warnings for recognised keys holding values of
    /// the wrong type; unrecognised variables are left alone.
    pub fn inject_from_scope(&mut self, scope: &Scope, arena: &BlockArena) -> Vec<String> {
        let mut warnings = Vec::new();

        let mut get_str = |name: &str, warnings: &mut Vec<String>| -> Option<String> {
            match scope.get_str(name) {
                Ok(v) => v.map(|s| s.to_string()),
                Err(e) => {
                    warnings.push(e.to_string());
                    None
                }
            }
        };

        if let Some(v) = get_str("name", &mut warnings) {
            self.name = v;
        }
        if let Some(v) = get_str("main_page", &mut warnings) {
            self.main_page = v;
        }

        for (key, field) in [
            ("root.wiki", RootField::Wiki),
            ("root.page", RootField::Page),
            ("root.image", RootField::Image),
            ("root.category", RootField::Category),
            ("root.file", RootField::File),
        ] {
            if let Some(v) = get_str(key, &mut warnings) {
                match field {
                    RootField::Wiki => self.root.wiki = v,
                    RootField::Page => self.root.page = v,
                    RootField::Image => self.root.image = v,
                    RootField::Category => self.root.category = v,
                    RootField::File => self.root.file = v,
                }
            }
        }

        for (key, field) in [
            ("dir.wiki", DirField::Wiki),
            ("dir.page", DirField::Page),
            ("dir.image", DirField::Image),
            ("dir.model", DirField::Model),
            ("dir.cache", DirField::Cache),
        ] {
            if let Some(v) = get_str(key, &mut warnings) {
                let path = PathBuf::from(v);
                match field {
                    DirField::Wiki => self.dir.wiki = path,
                    DirField::Page => self.dir.page = path,
                    DirField::Image => self.dir.image = path,
                    DirField::Model => self.dir.model = path,
                    DirField::Cache => self.dir.cache = path,
                }
            }
        }

        if let Some(v) = get_str("image.retina", &mut warnings) {
            let mut scales = Vec::new();
            for part in v.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                match part.parse::<u32>() {
                    Ok(n) if n > 0 => scales.push(n),
                    _ => warnings.push(format!("image.retina: bad scale '{}'", part)),
                }
            }
            self.image.retina = scales;
        }

        if let Some(v) = get_str("category.per_page", &mut warnings) {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.category_per_page = n,
                _ => warnings.push(format!("category.per_page: bad value '{}'", v)),
            }
        }

        match scope.get_bool("page.unsafe_html") {
            Ok(v) => self.unsafe_html = self.unsafe_html || v,
            Err(e) => warnings.push(e.to_string()),
        }

        // @navigation: { label: href; … };
        // block values refer into this page's own arena, so the parent
        // chain is not consulted
        match scope.get_own_block("navigation") {
            Ok(Some(id)) => {
                if let BlockData::Map(map) = &arena.get(id).data {
                    self.navigation = map
                        .entries
                        .iter()
                        .filter_map(|e| match &e.value {
                            MapValue::Text(href) => Some(NavItem {
                                label: e.key.clone(),
                                href: href.clone(),
                            }),
                            MapValue::Block(_) => {
                                warnings
                                    .push(format!("navigation.{}: expected a link target", e.key));
                                None
                            }
                        })
                        .collect();
                }
            }
            Ok(None) => {}
            Err(e) => warnings.push(e.to_string()),
        }

        // @external.<key>: { name: …; root: …; type: …; };
        match scope.get_own("external").map(|v| match v {
            Some(Value::Map(m)) => Some(m),
            _ => None,
        }) {
            Ok(Some(map)) => {
                for (key, value) in map.iter() {
                    let id = match value {
                        Value::Block(id) => *id,
                        _ => {
                            warnings.push(format!("external.{}: expected a map block", key));
                            continue;
                        }
                    };
                    let data = match &arena.get(id).data {
                        BlockData::Map(m) => m,
                        _ => continue,
                    };
                    let root = match data.get_str("root") {
                        Some(r) => r.trim_end_matches('/').to_string(),
                        None => {
                            warnings.push(format!("external.{}: missing root", key));
                            continue;
                        }
                    };
                    let name = data.get_str("name").unwrap_or(key).to_string();
                    let kind = ExternalType::from_str(data.get_str("type").unwrap_or(""));
                    self.external
                        .insert(key.to_string(), ExternalWiki { name, root, kind });
                }
            }
            Ok(None) => {}
            Err(e) => warnings.push(e.to_string()),
        }

        // reserved-looking names nothing reads are probably typos
        for (name, value) in scope.own_vars().iter() {
            flag_unrecognized(name, &mut warnings);
            if let Value::Map(map) = value {
                for (key, _) in map.iter() {
                    flag_unrecognized(&format!("{}.{}", name, key), &mut warnings);
                }
            }
        }

        warnings
    }
}

fn flag_unrecognized(name: &str, warnings: &mut Vec<String>) {
    if is_reserved_variable(name) && !recognized_variable(name) {
        warnings.push(format!("unrecognized variable @{}", name));
    }
}

/// Reserved names that injection or the page evaluator actually read.
/// `category.*`, `external.*`, and `host.*` are open namespaces.
fn recognized_variable(name: &str) -> bool {
    matches!(
        name,
        "name"
            | "main_page"
            | "navigation"
            | "page.title"
            | "page.author"
            | "page.created"
            | "page.draft"
            | "page.generated"
            | "page.redirect"
            | "page.unsafe_html"
            | "image.retina"
            | "root.wiki"
            | "root.page"
            | "root.image"
            | "root.category"
            | "root.file"
            | "dir.wiki"
            | "dir.page"
            | "dir.image"
            | "dir.model"
            | "dir.cache"
    ) || name.starts_with("category.")
        || name.starts_with("external.")
        || name.starts_with("host.")
}

enum RootField {
    Wiki,
    Page,
    Image,
    Category,
    File,
}

enum DirField {
    Wiki,
    Page,
    Image,
    Model,
    Cache,
}

fn resolve(base: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        base.join(dir)
    }
}
