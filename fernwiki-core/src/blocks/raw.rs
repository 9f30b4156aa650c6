//! `html{}` raw passthrough and `style{}` CSS collection.

use crate::html::Element;
use crate::page::Page;
use crate::tree::BlockId;

/// `style{}` contributes to the page's flat CSS stream and emits nothing.
pub fn parse_style(page: &mut Page, id: BlockId) {
    let css = page.arena.get(id).buf.text();
    let css = css.trim();
    if !css.is_empty() {
        page.add_style(css);
    }
}

/// `html{}` passes its content through unescaped, on unsafe pages only.
pub fn html_block(page: &mut Page, id: BlockId) -> Element {
    let mut el = Element::container();
    if page.opt.unsafe_html {
        let text = page.arena.get(id).buf.text();
        el.add_html(&text);
    } else {
        let pos = page.arena.get(id).open_pos;
        page.warn(pos, "html block requires unsafe html".to_string());
    }
    el
}
