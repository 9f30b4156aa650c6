//! `gallery{}` — a map of anonymous `image{}` blocks with derived thumbnails.

use super::{image, map, BlockData, MapValue};
use crate::html::Element;
use crate::page::Page;
use crate::tree::BlockId;

const DEFAULT_THUMB_HEIGHT: u32 = 220;

#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub image: BlockId,
    /// Full-size public URL, used as the anchor href.
    pub full_path: String,
    /// Thumbnail URL derived by re-parsing the image at `thumb_height`.
    pub thumb_path: String,
}

#[derive(Debug)]
pub struct GalleryData {
    pub thumb_height: u32,
    pub entries: Vec<GalleryEntry>,
}

impl Default for GalleryData {
    fn default() -> Self {
        Self {
            thumb_height: DEFAULT_THUMB_HEIGHT,
            entries: Vec::new(),
        }
    }
}

pub fn parse(page: &mut Page, id: BlockId) {
    let pairs = map::parse_pairs(page, id, true);

    let mut thumb_height = DEFAULT_THUMB_HEIGHT;
    let mut images = Vec::new();

    for entry in &pairs {
        if !entry.anon && entry.key == "thumb_height" {
            match entry.value.as_text().and_then(|t| t.trim().parse::<u32>().ok()) {
                Some(h) => thumb_height = h,
                None => page.warn(entry.pos, "thumb_height: expected integer".to_string()),
            }
            continue;
        }

        if !entry.anon {
            page.warn(entry.pos, format!("invalid key '{}'", entry.key));
            continue;
        }

        match entry.value {
            MapValue::Block(child) if page.arena.get(child).kind == "image" => {
                images.push(child);
            }
            _ => page.warn(entry.pos, format!("{}: expected image block", entry.key)),
        }
    }

    let mut entries = Vec::new();
    for img in images {
        let file = match image::data_of(page, img) {
            Some(d) if !d.file.is_empty() => d.file.clone(),
            _ => continue, // the image block already warned
        };

        // derive the thumbnail by re-parsing at the thumb height;
        // pregeneration takes care of the max retina scale
        image::set_dimensions(page, img, 0, thumb_height);
        let thumb_path = image::data_of(page, img)
            .map(|d| d.path.clone())
            .unwrap_or_default();

        let full_path = format!("{}/{}", page.opt.root.image, file);
        image::set_path(page, img, full_path.clone());

        entries.push(GalleryEntry {
            image: img,
            full_path,
            thumb_path,
        });
    }

    page.arena.get_mut(id).data = BlockData::Gallery(GalleryData {
        thumb_height,
        entries,
    });
}

pub fn html(page: &mut Page, id: BlockId) -> Element {
    let (thumb_height, entries) = match &page.arena.get(id).data {
        BlockData::Gallery(data) => (data.thumb_height, data.entries.clone()),
        _ => return Element::container(),
    };

    let mut el = Element::new("div");
    el.set_attr("data-thumb-height", &thumb_height.to_string());

    for entry in entries {
        let description = image::data_of(page, entry.image)
            .and_then(|d| d.description.clone())
            .unwrap_or_default();

        let mut a = Element::new("a");
        a.set_attr("href", &entry.full_path);
        a.set_attr("data-ngthumb", &entry.thumb_path);
        a.set_attr("data-ngdesc", &description);
        el.add_child(a);
    }
    el
}

#[cfg(test)]
mod tests {
    use crate::page::Page;

    fn render(source: &str) -> (String, Page) {
        let mut page = Page::from_source(source, Default::default());
        page.parse().expect("parse failed");
        let html = page.html();
        (html, page)
    }

    #[test]
    fn test_gallery_anchors() {
        let (html, page) = render(
            "gallery {\n\
             image { file: a.png; width: 640; height: 480; description: first; };\n\
             image { file: b.png; width: 800; height: 600; };\n\
             }",
        );
        assert!(html.contains("href=\"/image/a.png\""));
        assert!(html.contains("data-ngthumb=\"/image/0x220-a.png\""));
        assert!(html.contains("data-ngdesc=\"first\""));
        assert!(html.contains("href=\"/image/b.png\""));
        assert!(page.warnings.is_empty());
    }

    #[test]
    fn test_thumb_height_key() {
        let (html, _) =
            render("gallery { thumb_height: 100; image { file: a.png; width: 10; height: 10; }; }");
        assert!(html.contains("data-thumb-height=\"100\""));
        assert!(html.contains("data-ngthumb=\"/image/0x100-a.png\""));
    }

    #[test]
    fn test_thumb_height_not_integer_warns() {
        let (_, page) = render(
            "gallery { thumb_height: tall; image { file: a.png; width: 10; height: 10; }; }",
        );
        assert!(page
            .warnings
            .iter()
            .any(|w| w.message.contains("thumb_height: expected integer")));
    }

    #[test]
    fn test_invalid_key_warns() {
        let (_, page) = render("gallery { color: red; }");
        assert!(page
            .warnings
            .iter()
            .any(|w| w.message.contains("invalid key 'color'")));
    }

    #[test]
    fn test_non_image_value_warns() {
        let (_, page) = render("gallery { just text; }");
        assert!(page
            .warnings
            .iter()
            .any(|w| w.message.contains("expected image block")));
    }

    #[test]
    fn test_thumbnail_dimensions_registered() {
        let (_, page) =
            render("gallery { image { file: a.png; width: 640; height: 480; }; }");
        let dims = page.images().get("a.png").unwrap();
        assert!(dims.contains(&(640, 480)));
        assert!(dims.contains(&(0, 220)));
    }
}
