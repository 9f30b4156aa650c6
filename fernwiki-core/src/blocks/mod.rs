//! The block catalog.
//!
//! Each built-in block kind implements two operations: `parse`, which
//! validates keys and registers side effects with the page (images used,
//! categories referenced), and `html`, which emits into an element tree.
//! Unknown keys and wrong-typed values produce positional warnings; only
//! structural lex errors abort a page.

pub mod code;
pub mod containers;
pub mod gallery;
pub mod image;
pub mod map;
pub mod model;
pub mod raw;
pub mod sec;

pub use gallery::{GalleryData, GalleryEntry};
pub use image::ImageData;
pub use map::{MapData, MapEntry, MapValue};
pub use sec::SecData;

use crate::html::Element;
use crate::page::Page;
use crate::tree::BlockId;

/// Kind-specific state attached to a block node after parse.
#[derive(Debug, Default)]
pub enum BlockData {
    #[default]
    None,
    Map(MapData),
    List(ListData),
    Image(ImageData),
    Gallery(GalleryData),
    Sec(SecData),
}

/// Items of a `list{}` / `numlist{}` block.
#[derive(Debug, Default)]
pub struct ListData {
    pub items: Vec<MapEntry>,
}

/// Parse a block and its children, depth first.
pub fn parse(page: &mut Page, id: BlockId) {
    for child in page.arena.get(id).children() {
        parse(page, child);
    }

    let kind = page.arena.get(id).kind.clone();
    match kind.as_str() {
        "main" | "p" | "quote" | "fmt" | "code" | "html" | "variable" => {}
        "style" => raw::parse_style(page, id),
        "sec" => sec::parse(page, id),
        "map" => map::parse(page, id),
        "list" | "numlist" => containers::parse_list(page, id),
        "image" => image::parse(page, id),
        "gallery" => gallery::parse(page, id),
        "model" => model::parse(page, id),
        other => {
            let pos = page.arena.get(id).open_pos;
            page.warn(pos, format!("unknown block type '{}'", other));
        }
    }
}

/// Generate the HTML element for a block.
pub fn html(page: &mut Page, id: BlockId) -> Element {
    let kind = page.arena.get(id).kind.clone();
    let mut el = match kind.as_str() {
        "main" => containers::html_main(page, id),
        "p" => containers::html_tag(page, id, "p"),
        "quote" => containers::html_tag(page, id, "blockquote"),
        "list" => containers::html_list(page, id, "ul"),
        "numlist" => containers::html_list(page, id, "ol"),
        "sec" => sec::html(page, id),
        "code" => code::html(page, id),
        "map" => map::html(page, id),
        "image" => image::html(page, id),
        "gallery" => gallery::html(page, id),
        "model" => model::html(page, id),
        "html" => raw::html_block(page, id),
        "style" => Element::container(),
        // fmt, variable, and anything unknown render as formatted content
        _ => containers::html_fmt(page, id),
    };

    if !el.no_tags {
        el.classes.insert(0, format!("wiki-{}", kind));
        for class in page.arena.get(id).classes.clone() {
            el.add_class(&class);
        }
    }
    el
}

/// Slug for a heading id or link fragment: lowercased, alphanumerics kept,
/// everything else collapsed to single hyphens.
pub fn heading_slug(s: &str) -> String {
    let mut out = String::new();
    let mut pending_dash = false;
    for c in s.to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}
