//! Plain container blocks: `main`, `p`, `quote`, `fmt`, `list`, `numlist`.

use super::{map, BlockData, ListData, MapValue};
use crate::catch::Content;
use crate::format::{format_text, FmtOpts};
use crate::html::Element;
use crate::page::Page;
use crate::tree::BlockId;

/// Format a block's text runs and render its children into `el`, in
/// document order.
pub(crate) fn format_runs_into(page: &mut Page, id: BlockId, el: &mut Element) {
    let runs = page.arena.get(id).buf.runs().to_vec();
    for run in runs {
        match run.content {
            Content::Text(s) => {
                let html = format_text(page, &s, &FmtOpts::at(run.pos));
                el.add_html(&html);
            }
            Content::Child(child) => el.add_child(super::html(page, child)),
        }
    }
}

pub fn html_main(page: &mut Page, id: BlockId) -> Element {
    let mut el = Element::new("div");
    format_runs_into(page, id, &mut el);
    el
}

pub fn html_tag(page: &mut Page, id: BlockId, tag: &str) -> Element {
    let mut el = Element::new(tag);
    format_runs_into(page, id, &mut el);
    el
}

/// Invisible formatted-content container.
pub fn html_fmt(page: &mut Page, id: BlockId) -> Element {
    let mut el = Element::container();
    format_runs_into(page, id, &mut el);
    el
}

/// `list{}` / `numlist{}` items are `;`-separated values, text or blocks.
pub fn parse_list(page: &mut Page, id: BlockId) {
    let items = map::parse_pairs(page, id, false);
    page.arena.get_mut(id).data = BlockData::List(ListData { items });
}

pub fn html_list(page: &mut Page, id: BlockId, tag: &str) -> Element {
    let mut el = Element::new(tag);

    let items = match &page.arena.get(id).data {
        BlockData::List(data) => data.items.clone(),
        _ => Vec::new(),
    };

    for item in items {
        let mut li = Element::new("li");
        match item.value {
            MapValue::Text(text) => {
                let html = format_text(page, &text, &FmtOpts::at(item.pos));
                li.add_html(&html);
            }
            MapValue::Block(child) => li.add_child(super::html(page, child)),
        }
        el.add_child(li);
    }
    el
}
