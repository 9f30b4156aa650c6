//! `image{}` — a sized image reference.
//!
//! Keys: `file`, `width`, `height`, `align`, `description`. Missing
//! dimensions resolve from the on-disk image. Every occurrence registers the
//! requested dimensions with the page, which drives retina pre-generation
//! and the image category payloads.

use super::{map, BlockData, MapEntry, MapValue};
use crate::html::Element;
use crate::page::Page;
use crate::tree::BlockId;

#[derive(Debug, Clone, Default)]
pub struct ImageData {
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub align: Option<String>,
    pub description: Option<String>,
    /// Public URL of the (possibly sized) image.
    pub path: String,
}

pub fn parse(page: &mut Page, id: BlockId) {
    let entries = map::parse_pairs(page, id, true);
    let open_pos = page.arena.get(id).open_pos;

    let mut data = ImageData::default();
    for entry in &entries {
        if entry.anon {
            page.warn(entry.pos, "invalid value in image block".to_string());
            continue;
        }
        match entry.key.as_str() {
            "file" => match entry.value.as_text() {
                Some(t) => data.file = t.to_string(),
                None => page.warn(entry.pos, "file: expected text".to_string()),
            },
            "width" => data.width = parse_dimension(page, entry),
            "height" => data.height = parse_dimension(page, entry),
            "align" => data.align = entry.value.as_text().map(str::to_string),
            "description" | "desc" => {
                if data.description.is_none() {
                    data.description = entry.value.as_text().map(str::to_string);
                }
            }
            other => page.warn(entry.pos, format!("invalid key '{}'", other)),
        }
    }

    if data.file.is_empty() {
        page.warn(open_pos, "image has no file".to_string());
        page.arena.get_mut(id).data = BlockData::Image(data);
        return;
    }

    // neither dimension given: resolve from the image on disk
    if data.width == 0 && data.height == 0 {
        let disk = page.opt.dir.image.join(&data.file);
        match ::image::image_dimensions(&disk) {
            Ok((w, h)) => {
                data.width = w;
                data.height = h;
            }
            Err(_) => page.warn(open_pos, format!("image '{}' not found", data.file)),
        }
    }

    register(page, &mut data);
    page.arena.get_mut(id).data = BlockData::Image(data);
}

/// Record the requested dimensions with the page and derive the public path.
fn register(page: &mut Page, data: &mut ImageData) {
    page.record_image(&data.file, (data.width, data.height));
    data.path = if data.width == 0 && data.height == 0 {
        format!("{}/{}", page.opt.root.image, data.file)
    } else {
        format!(
            "{}/{}x{}-{}",
            page.opt.root.image, data.width, data.height, data.file
        )
    };
}

/// Re-parse an image with forced dimensions (used by galleries to derive
/// thumbnails). Registers the new dimensions like a fresh occurrence.
pub(crate) fn set_dimensions(page: &mut Page, id: BlockId, width: u32, height: u32) {
    let mut data = match &page.arena.get(id).data {
        BlockData::Image(d) => d.clone(),
        _ => return,
    };
    if data.file.is_empty() {
        return;
    }
    data.width = width;
    data.height = height;
    register(page, &mut data);
    page.arena.get_mut(id).data = BlockData::Image(data);
}

pub(crate) fn data_of(page: &Page, id: BlockId) -> Option<&ImageData> {
    match &page.arena.get(id).data {
        BlockData::Image(d) => Some(d),
        _ => None,
    }
}

pub(crate) fn set_path(page: &mut Page, id: BlockId, path: String) {
    if let BlockData::Image(d) = &mut page.arena.get_mut(id).data {
        d.path = path;
    }
}

fn parse_dimension(page: &mut Page, entry: &MapEntry) -> u32 {
    let text = match &entry.value {
        MapValue::Text(t) => t.trim().trim_end_matches("px"),
        MapValue::Block(_) => {
            page.warn(entry.pos, format!("{}: expected integer", entry.key));
            return 0;
        }
    };
    match text.parse::<u32>() {
        Ok(n) => n,
        Err(_) => {
            page.warn(entry.pos, format!("{}: expected integer", entry.key));
            0
        }
    }
}

pub fn html(page: &mut Page, id: BlockId) -> Element {
    let data = match data_of(page, id) {
        Some(d) if !d.file.is_empty() => d.clone(),
        _ => return Element::container(),
    };

    let mut img = Element::new("img");
    img.set_attr("src", &data.path);
    img.set_attr("alt", data.description.as_deref().unwrap_or(&data.file));
    if data.width != 0 {
        img.set_attr("width", &data.width.to_string());
    }
    if data.height != 0 {
        img.set_attr("height", &data.height.to_string());
    }
    if let Some(align) = &data.align {
        img.add_class(&format!("align-{}", align));
    }
    img
}
