//! Arena-owned block tree.
//!
//! Blocks live in a slab owned by the page; parents and children refer to
//! each other through stable [`BlockId`] indices, so traversal never needs
//! recursive ownership.

use crate::blocks::BlockData;
use crate::catch::ContentBuf;
use crate::position::Position;

/// Stable index of a block within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) usize);

/// A typed node in the block tree.
#[derive(Debug)]
pub struct BlockNode {
    /// Block type, e.g. `sec`, `image`, `main`.
    pub kind: String,
    /// Optional `[name]` from the block header.
    pub name: Option<String>,
    /// Ordered CSS-like class suffixes from `type.class.class`.
    pub classes: Vec<String>,
    pub open_pos: Position,
    pub close_pos: Position,
    pub closed: bool,
    pub parent: Option<BlockId>,
    /// Alternating raw text runs and child block references.
    pub buf: ContentBuf,
    /// Kind-specific state filled in by the block catalog during parse.
    pub data: BlockData,
}

impl BlockNode {
    pub fn new(kind: &str, parent: Option<BlockId>, open_pos: Position) -> Self {
        Self {
            kind: kind.to_string(),
            name: None,
            classes: Vec::new(),
            open_pos,
            close_pos: Position::default(),
            closed: false,
            parent,
            buf: ContentBuf::new(),
            data: BlockData::None,
        }
    }

    /// Child block ids in document order.
    pub fn children(&self) -> Vec<BlockId> {
        self.buf
            .runs()
            .iter()
            .filter_map(|run| match run.content {
                crate::catch::Content::Child(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

/// Slab of blocks owned by a page.
#[derive(Debug, Default)]
pub struct BlockArena {
    nodes: Vec<BlockNode>,
}

impl BlockArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: BlockNode) -> BlockId {
        let id = BlockId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: BlockId) -> &BlockNode {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: BlockId) -> &mut BlockNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_parenting() {
        let mut arena = BlockArena::new();
        let main = arena.push(BlockNode::new("main", None, Position::default()));
        let child = arena.push(BlockNode::new("sec", Some(main), Position::new(1, 4)));
        arena.get_mut(main).buf.push_child(child, Position::new(1, 4));

        assert_eq!(arena.get(child).parent, Some(main));
        assert_eq!(arena.get(main).children(), vec![child]);
    }
}
