//! Lexer sinks ("catches") and their positioned content buffers.
//!
//! A catch is the current destination for bytes emitted by the lexer: the
//! open block, a variable name, a variable value, or a brace-escape region.
//! Each catch accumulates positioned runs of text interleaved with child
//! block references.

use crate::position::Position;
use crate::tree::BlockId;

/// One item of accumulated content: a text run or a child block reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Child(BlockId),
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Child(_) => None,
        }
    }
}

/// A content item together with the position where it began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosContent {
    pub content: Content,
    pub pos: Position,
}

/// Positioned content buffer shared by all catch kinds.
///
/// Adjacent text appends merge into the current run; a run ends at a newline
/// so that downstream consumers see one run per source line. The leading
/// whitespace of the first non-trivial line establishes an indent prefix
/// which is stripped from every line of the same buffer.
#[derive(Debug, Clone, Default)]
pub struct ContentBuf {
    runs: Vec<PosContent>,
    line: String,
    saw_first_line: bool,
    remove_indent: String,
}

impl ContentBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text fragment at the given position.
    pub fn append_text(&mut self, s: &str, pos: Position) {
        if s.is_empty() {
            return;
        }
        self.line.push_str(s);

        if s.ends_with('\n') {
            if !self.saw_first_line && self.line.len() > 2 {
                self.saw_first_line = true;
                let trimmed = self.line.trim_start_matches([' ', '\t']);
                let indent_len = self.line.len() - trimmed.len();
                if indent_len != 0 {
                    self.remove_indent = self.line[..indent_len].to_string();
                }
            }
            self.finish_line();
        }

        // merge into the last run unless it ended in a newline
        match self.runs.last_mut() {
            Some(PosContent {
                content: Content::Text(last),
                ..
            }) if !last.ends_with('\n') => last.push_str(s),
            _ => self.runs.push(PosContent {
                content: Content::Text(s.to_string()),
                pos,
            }),
        }
    }

    /// Append a child block reference.
    pub fn push_child(&mut self, id: BlockId, pos: Position) {
        self.runs.push(PosContent {
            content: Content::Child(id),
            pos,
        });
    }

    /// Append already-positioned runs, e.g. a flushed child catch.
    pub fn append_runs(&mut self, runs: Vec<PosContent>) {
        for run in runs {
            match run.content {
                Content::Text(s) => self.append_text(&s, run.pos),
                Content::Child(id) => self.push_child(id, run.pos),
            }
        }
    }

    // strip the established indent from the line that just completed
    fn finish_line(&mut self) {
        self.line.clear();
        if self.remove_indent.is_empty() {
            return;
        }
        if let Some(PosContent {
            content: Content::Text(last),
            ..
        }) = self.runs.last_mut()
        {
            let line_start = match last.rfind('\n') {
                Some(i) => i + 1,
                None => 0,
            };
            if last[line_start..].starts_with(self.remove_indent.as_str()) {
                let indent_len = self.remove_indent.len();
                last.replace_range(line_start..line_start + indent_len, "");
            }
        }
    }

    /// The trailing text run, if the last item is text.
    pub fn last_string(&self) -> Option<&str> {
        match self.runs.last() {
            Some(PosContent {
                content: Content::Text(s),
                ..
            }) => Some(s),
            _ => None,
        }
    }

    /// Replace the trailing text run (used by the block-header back-scan).
    /// An empty replacement removes the run entirely.
    pub fn set_last_string(&mut self, s: String) {
        match self.runs.last_mut() {
            Some(PosContent {
                content: Content::Text(last),
                ..
            }) => {
                if s.is_empty() {
                    self.runs.pop();
                } else {
                    *last = s;
                }
            }
            _ => {}
        }
    }

    pub fn runs(&self) -> &[PosContent] {
        &self.runs
    }

    pub fn into_runs(self) -> Vec<PosContent> {
        self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// All text runs concatenated, ignoring child blocks.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for run in &self.runs {
            if let Content::Text(s) = &run.content {
                out.push_str(s);
            }
        }
        out
    }

    /// True if any run is a child block reference.
    pub fn has_children(&self) -> bool {
        self.runs
            .iter()
            .any(|r| matches!(r.content, Content::Child(_)))
    }
}

/// The lexer's current sink, held on a stack rooted at the main block.
#[derive(Debug)]
pub enum Catch {
    /// Content flows into the block's own buffer in the arena.
    Block(BlockId),
    /// Literal region opened by `{{`; content flows into the block raw.
    BraceEscape(BlockId),
    /// `@name` / `%name` up to `:` or `;`.
    VariableName {
        /// the declaration prefix as written (`@`, `%`, `-@`, `-%`)
        prefix: String,
        pos: Position,
        buf: ContentBuf,
        not_interpolated: bool,
        negated: bool,
    },
    /// Value text/blocks after `:` up to `;`.
    VariableValue {
        name: String,
        pos: Position,
        buf: ContentBuf,
        not_interpolated: bool,
        negated: bool,
    },
}

impl Catch {
    /// Human-readable kind name used in positional lex errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Catch::Block(_) => "block",
            Catch::BraceEscape(_) => "brace escape",
            Catch::VariableName { .. } => "variable name",
            Catch::VariableValue { .. } => "variable value",
        }
    }

    /// Whether the byte may be appended to this catch.
    pub fn byte_ok(&self, b: u8) -> bool {
        match self {
            Catch::Block(_) | Catch::BraceEscape(_) | Catch::VariableValue { .. } => true,
            Catch::VariableName { .. } => b.is_ascii_alphanumeric() || b == b'_' || b == b'.',
        }
    }

    /// Whether the byte terminates this catch, flushing its content to the
    /// parent catch.
    pub fn should_skip_byte(&self, b: u8) -> bool {
        match self {
            Catch::VariableName { .. } => b.is_ascii_whitespace(),
            _ => false,
        }
    }
}
