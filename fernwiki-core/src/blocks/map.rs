//! `map{}` — the key/value container, and the default for untyped blocks.
//!
//! Pairs take the form `key: value;`. A value may be a nested block. Entries
//! without a key are anonymous and receive `anon_N` keys in order.

use super::BlockData;
use crate::catch::Content;
use crate::html::Element;
use crate::page::Page;
use crate::position::Position;
use crate::tree::BlockId;

/// One parsed `key: value;` pair.
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: String,
    pub pos: Position,
    pub value: MapValue,
    pub anon: bool,
}

/// A map value: raw text (formatted by consumers) or a child block.
#[derive(Debug, Clone)]
pub enum MapValue {
    Text(String),
    Block(BlockId),
}

impl MapValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MapValue::Text(s) => Some(s),
            MapValue::Block(_) => None,
        }
    }
}

/// Parsed pairs of a map-like block, in source order.
#[derive(Debug, Default)]
pub struct MapData {
    pub entries: Vec<MapEntry>,
}

impl MapData {
    pub fn get(&self, key: &str) -> Option<&MapValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_text())
    }
}

pub fn parse(page: &mut Page, id: BlockId) {
    let entries = parse_pairs(page, id, true);
    page.arena.get_mut(id).data = BlockData::Map(MapData { entries });
}

/// A bare map renders nothing; it is a data container for its parent.
pub fn html(_page: &mut Page, _id: BlockId) -> Element {
    Element::container()
}

/// Split a block's content into entries. With `keyed` false (lists), `:`
/// has no meaning and every entry is anonymous.
pub(crate) fn parse_pairs(page: &mut Page, id: BlockId, keyed: bool) -> Vec<MapEntry> {
    let runs = page.arena.get(id).buf.runs().to_vec();
    let open_pos = page.arena.get(id).open_pos;

    let mut entries = Vec::new();
    let mut warnings: Vec<(Position, String)> = Vec::new();
    let mut key: Option<String> = None;
    let mut text = String::new();
    let mut block: Option<BlockId> = None;
    let mut entry_pos: Option<Position> = None;
    let mut anon_count = 0usize;

    for run in runs {
        match run.content {
            Content::Child(child) => {
                entry_pos.get_or_insert(run.pos);
                if block.is_some() {
                    warnings.push((run.pos, "value already contains a block".to_string()));
                } else {
                    block = Some(child);
                }
            }
            Content::Text(s) => {
                let mut chars = s.chars();
                while let Some(c) = chars.next() {
                    match c {
                        // escapes reinjected by the lexer
                        '\\' => {
                            entry_pos.get_or_insert(run.pos);
                            text.push(chars.next().unwrap_or('\\'));
                        }
                        ':' if keyed && key.is_none() && block.is_none() => {
                            entry_pos.get_or_insert(run.pos);
                            key = Some(text.trim().to_string());
                            text.clear();
                        }
                        ';' => finish_entry(
                            &mut entries,
                            &mut warnings,
                            &mut key,
                            &mut text,
                            &mut block,
                            &mut entry_pos,
                            &mut anon_count,
                            run.pos,
                        ),
                        c => {
                            if !c.is_whitespace() {
                                entry_pos.get_or_insert(run.pos);
                            }
                            text.push(c);
                        }
                    }
                }
            }
        }
    }

    // dangling entry without a terminating `;`
    if key.is_some() || block.is_some() || !text.trim().is_empty() {
        let pos = entry_pos.unwrap_or(open_pos);
        warnings.push((pos, "value missing trailing ';'".to_string()));
        finish_entry(
            &mut entries,
            &mut warnings,
            &mut key,
            &mut text,
            &mut block,
            &mut entry_pos,
            &mut anon_count,
            pos,
        );
    }

    for (pos, message) in warnings {
        page.warn(pos, message);
    }
    entries
}

#[allow(clippy::too_many_arguments)]
fn finish_entry(
    entries: &mut Vec<MapEntry>,
    warnings: &mut Vec<(Position, String)>,
    key: &mut Option<String>,
    text: &mut String,
    block: &mut Option<BlockId>,
    entry_pos: &mut Option<Position>,
    anon_count: &mut usize,
    fallback: Position,
) {
    let k = key.take();
    let t = std::mem::take(text).trim().to_string();
    let b = block.take();
    let pos = entry_pos.take().unwrap_or(fallback);

    // empty segment between semicolons
    if k.is_none() && b.is_none() && t.is_empty() {
        return;
    }

    if b.is_some() && !t.is_empty() {
        warnings.push((pos, "value contains both text and a block".to_string()));
    }

    let value = match b {
        Some(id) => MapValue::Block(id),
        None => MapValue::Text(t),
    };

    match k {
        Some(k) if !k.is_empty() => entries.push(MapEntry {
            key: k,
            pos,
            value,
            anon: false,
        }),
        _ => {
            entries.push(MapEntry {
                key: format!("anon_{}", *anon_count),
                pos,
                value,
                anon: true,
            });
            *anon_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::blocks::BlockData;
    use crate::page::Page;

    fn parsed(source: &str) -> Page {
        let mut page = Page::from_source(source, Default::default());
        page.parse().expect("parse failed");
        page
    }

    fn map_entries(page: &Page) -> &super::MapData {
        let main = page.main_block().unwrap();
        let child = page.arena_ref().get(main).children()[0];
        match &page.arena_ref().get(child).data {
            BlockData::Map(m) => m,
            other => panic!("expected map data, got {:?}", other),
        }
    }

    #[test]
    fn test_keyed_pairs() {
        let page = parsed("map { a: 1; b: two; }");
        let data = map_entries(&page);
        assert_eq!(data.entries.len(), 2);
        assert_eq!(data.get_str("a"), Some("1"));
        assert_eq!(data.get_str("b"), Some("two"));
        assert!(page.warnings.is_empty());
    }

    #[test]
    fn test_anonymous_values() {
        let page = parsed("map { one; two; }");
        let data = map_entries(&page);
        assert_eq!(data.entries.len(), 2);
        assert!(data.entries[0].anon);
        assert_eq!(data.entries[0].key, "anon_0");
        assert_eq!(data.entries[1].key, "anon_1");
    }

    #[test]
    fn test_block_value() {
        let page = parsed("map { inner: map { x: y; }; }");
        let data = map_entries(&page);
        assert_eq!(data.entries.len(), 1);
        assert!(matches!(
            data.entries[0].value,
            super::MapValue::Block(_)
        ));
    }

    #[test]
    fn test_colon_in_value_kept() {
        let page = parsed("map { url: https://example.com; }");
        let data = map_entries(&page);
        assert_eq!(data.get_str("url"), Some("https://example.com"));
    }

    #[test]
    fn test_missing_semicolon_warns() {
        let page = parsed("map { a: 1 }");
        let data = map_entries(&page);
        assert_eq!(data.get_str("a"), Some("1"));
        assert_eq!(page.warnings.len(), 1);
        assert!(page.warnings[0].message.contains("missing trailing ';'"));
    }
}
