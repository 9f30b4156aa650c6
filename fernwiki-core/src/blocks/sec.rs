//! `sec [Heading]{}` — a section with a generated heading id.

use super::{containers, heading_slug, BlockData};
use crate::format::{format_text, FmtOpts};
use crate::html::Element;
use crate::page::Page;
use crate::tree::BlockId;

#[derive(Debug, Default)]
pub struct SecData {
    pub heading: Option<String>,
    /// Heading id, unique within the page.
    pub heading_id: Option<String>,
}

pub fn parse(page: &mut Page, id: BlockId) {
    let heading = page.arena.get(id).name.clone();
    let heading_id = heading.as_deref().map(|h| {
        let slug = heading_slug(h);
        let slug = if slug.is_empty() { "section".to_string() } else { slug };
        page.unique_heading_id(&slug)
    });
    page.arena.get_mut(id).data = BlockData::Sec(SecData {
        heading,
        heading_id,
    });
}

pub fn html(page: &mut Page, id: BlockId) -> Element {
    let mut el = Element::new("section");

    let (heading, heading_id) = match &page.arena.get(id).data {
        BlockData::Sec(data) => (data.heading.clone(), data.heading_id.clone()),
        _ => (None, None),
    };

    if let Some(heading) = heading {
        let level = (heading_depth(page, id) + 1).min(6);
        let mut h = Element::new(&format!("h{}", level));
        if let Some(hid) = heading_id {
            h.set_id(&hid);
        }
        let pos = page.arena.get(id).open_pos;
        let html = format_text(page, &heading, &FmtOpts::at(pos));
        h.add_html(&html);
        el.add_child(h);
    }

    containers::format_runs_into(page, id, &mut el);
    el
}

// h2 for a top-level section, one deeper per nested sec
fn heading_depth(page: &Page, id: BlockId) -> usize {
    let mut depth = 1;
    let mut current = page.arena.get(id).parent;
    while let Some(pid) = current {
        if page.arena.get(pid).kind == "sec" {
            depth += 1;
        }
        current = page.arena.get(pid).parent;
    }
    depth
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
    fn test_heading_and_id() {
        let (html, page) = render("sec [Hi]{ body }");
        assert!(html.contains("<h2 id=\"hi\">Hi</h2>"));
        assert!(html.contains("body"));
        assert!(page.warnings.is_empty());
    }

    #[test]
    fn test_heading_id_collision_suffix() {
        let (html, _) = render("sec [Same]{ a } sec [Same]{ b }");
        assert!(html.contains("id=\"same\""));
        assert!(html.contains("id=\"same-1\""));
    }

    #[test]
    fn test_nested_section_levels() {
        let (html, _) = render("sec [Outer]{ sec [Inner]{ x } }");
        assert!(html.contains("<h2 id=\"outer\">"));
        assert!(html.contains("<h3 id=\"inner\">"));
    }

    #[test]
    fn test_section_without_heading() {
        let (html, _) = render("sec { just content }");
        assert!(html.contains("<section class=\"wiki-sec\">"));
        assert!(!html.contains("<h2"));
    }
}
