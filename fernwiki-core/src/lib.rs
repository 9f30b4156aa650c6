//! # fernwiki-core
//!
//! The wiki-source compiler: a byte-oriented lexer, a typed block parser,
//! hierarchical variable scopes, an inline formatter, the built-in block
//! catalog, and the page evaluator that drives parse and HTML generation.
//!
//! This crate is purely CPU-bound apart from resolving on-disk image
//! dimensions and model files; the wiki lifecycle (caches, categories,
//! display operations) lives in `fernwiki-runtime`.

pub mod blocks;
pub mod catch;
pub mod format;
pub mod html;
pub mod lexer;
pub mod opt;
pub mod page;
mod parser;
pub mod position;
pub mod scope;
pub mod tree;

pub use format::{format_text, normalize_name, FmtOpts};
pub use html::{escape_html, strip_tags, Element};
pub use lexer::{ParseError, Parser};
pub use opt::{DirOpt, ExternalType, ExternalWiki, ImageOpt, NavItem, PageOpt, RootOpt};
pub use page::{Page, PageError, PageInfo, Warning};
pub use position::Position;
pub use scope::{Scope, ScopeError, Value, ValueMap};
pub use tree::{BlockArena, BlockId, BlockNode};
