//! `model [name]{}` / `$name{}` — renders a reusable template page with the
//! block's own keys merged into its scope as `m.*` variables.

use super::{map, BlockData, MapValue};
use crate::html::Element;
use crate::page::Page;
use crate::scope::Value;
use crate::tree::BlockId;

// models including models stop here
const MAX_MODEL_DEPTH: usize = 5;

pub fn parse(page: &mut Page, id: BlockId) {
    let entries = map::parse_pairs(page, id, true);
    page.arena.get_mut(id).data = BlockData::Map(map::MapData { entries });

    match page.arena.get(id).name.clone() {
        Some(name) => page.record_model(&name),
        None => {
            let pos = page.arena.get(id).open_pos;
            page.warn(pos, "model has no name".to_string());
        }
    }
}

pub fn html(page: &mut Page, id: BlockId) -> Element {
    let pos = page.arena.get(id).open_pos;
    let name = match page.arena.get(id).name.clone() {
        Some(name) => name,
        None => return Element::container(),
    };

    if page.model_depth >= MAX_MODEL_DEPTH {
        page.warn(pos, format!("model '{}': nesting too deep", name));
        return Element::container();
    }

    let file = page.opt.dir.model.join(format!("{}.model", name));
    let source = match std::fs::read_to_string(&file) {
        Ok(s) => s,
        Err(_) => {
            page.warn(pos, format!("model '{}' not found", name));
            return Element::container();
        }
    };

    let entries = match &page.arena.get(id).data {
        BlockData::Map(data) => data.entries.clone(),
        _ => Vec::new(),
    };

    // the model inherits the page's scope, so wiki defaults and page
    // variables interpolate inside it; m.* arguments shadow on top
    let mut sub = Page::from_source(&source, page.opt.clone()).with_defaults(page.scope().clone());
    sub.model_depth = page.model_depth + 1;
    for entry in entries {
        match entry.value {
            MapValue::Text(text) => {
                let _ = sub
                    .scope_mut()
                    .set(&format!("m.{}", entry.key), Value::Str(text));
            }
            MapValue::Block(_) => {
                page.warn(entry.pos, format!("m.{}: block values are not supported", entry.key));
            }
        }
    }

    if let Err(e) = sub.parse() {
        page.warn(pos, format!("model '{}': {}", name, e));
        return Element::container();
    }
    let html = sub.html();
    page.absorb(&name, sub);

    let mut el = Element::container();
    el.add_html(&html);
    el
}
