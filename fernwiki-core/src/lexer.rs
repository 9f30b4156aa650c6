//! The wiki-source lexer.
//!
//! A byte-oriented state machine fed one line at a time. It tracks escapes,
//! nested comments, and brace-escape regions, and routes everything else to
//! the current catch. All syntactic bytes are ASCII; multi-byte UTF-8
//! sequences pass straight through as content, and positions count bytes.
//! Block opening/closing and variable declarations live in the parser half
//! of this struct (see `parser.rs`).

use crate::catch::{Catch, Content, PosContent};
use crate::page::Page;
use crate::position::Position;
use crate::tree::BlockId;
use thiserror::Error;

/// A positional lex or structural parse error, fatal to the page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {pos}")]
pub struct ParseError {
    pub message: String,
    pub pos: Position,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, pos: Position) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

/// Lexer and block-parser state over one page source.
pub struct Parser {
    pub(crate) pos: Position,
    pub(crate) last: u8,
    pub(crate) next: u8,
    pub(crate) skip: bool,
    pub(crate) ignore: bool,
    pub(crate) escape: bool,
    comment_level: usize,
    pub(crate) brace_level: usize,
    pub(crate) brace_first: bool,
    pub(crate) catches: Vec<Catch>,
    /// The innermost open block.
    pub(crate) block: BlockId,
}

impl Parser {
    /// A parser rooted at the given main block.
    pub fn new(main: BlockId) -> Self {
        Self {
            pos: Position::default(),
            last: 0,
            next: 0,
            skip: false,
            ignore: false,
            escape: false,
            comment_level: 0,
            brace_level: 0,
            brace_first: false,
            catches: vec![Catch::Block(main)],
            block: main,
        }
    }

    /// Feed one source line (without its newline; CR is stripped). A
    /// synthetic `\n` byte is processed after the line's own bytes.
    pub fn parse_line(&mut self, line: &str, page: &mut Page) -> Result<(), ParseError> {
        self.pos.line += 1;
        let line = line.strip_suffix('\r').unwrap_or(line);
        let bytes = line.as_bytes();

        let mut i = 0;
        while i <= bytes.len() {
            let b = if i == bytes.len() { b'\n' } else { bytes[i] };

            // skip is only ever set when the next byte is ASCII
            if self.skip {
                self.skip = false;
                i += 1;
                continue;
            }
            self.pos.column = i + 1;

            // non-ASCII is never syntactic; the whole UTF-8 sequence goes
            // through as one opaque content fragment
            if b >= 0x80 {
                let end = i + utf8_len(b);
                if self.brace_level == 0 && self.comment_level != 0 {
                    self.advance(b)?;
                } else {
                    self.handle_text(&line[i..end], page)?;
                }
                i = end;
                continue;
            }

            self.next = match (i + 1).cmp(&bytes.len()) {
                std::cmp::Ordering::Less => bytes[i + 1],
                std::cmp::Ordering::Equal => b'\n',
                std::cmp::Ordering::Greater => 0,
            };
            self.parse_byte(b, page)?;
            i += 1;
        }
        Ok(())
    }

    fn parse_byte(&mut self, b: u8, page: &mut Page) -> Result<(), ParseError> {
        // brace-escape region: everything is literal until the matching `}}`
        if self.brace_level != 0 {
            let is_first = self.brace_first;
            self.brace_first = false;

            if b == b'{' && !is_first {
                self.brace_level += 1;
            } else if b == b'}' {
                self.brace_level -= 1;
                if self.brace_level == 0 {
                    // the closing `}` of `}}` is handled as a normal block close
                    self.catches.pop();
                }
            }

            if is_first || self.brace_level == 0 {
                return self.advance(b);
            }
            return self.handle_byte(b, page);
        }

        // comment entrance
        if b == b'/' && self.next == b'*' {
            self.ignore = true;
            if self.escape {
                return self.handle_byte(b, page);
            }
            self.comment_level += 1;
            return self.advance(b);
        }

        // comment exit
        if b == b'*' && self.next == b'/' {
            if self.comment_level == 0 {
                return self.handle_byte(b, page);
            }
            self.comment_level -= 1;
            self.skip = true;
            return self.advance(b);
        }

        // inside a comment everything is discarded
        if self.comment_level != 0 {
            return self.advance(b);
        }

        if b == b'{' {
            self.ignore = true;
            if self.escape {
                return self.handle_byte(b, page);
            }
            self.open_block(page)?;
            return self.advance(b);
        }

        if b == b'}' {
            self.ignore = true;
            if self.escape {
                return self.handle_byte(b, page);
            }
            self.close_block(page)?;
            return self.advance(b);
        }

        if b == b'\\' {
            if self.escape {
                self.ignore = true;
                return self.handle_byte(b, page);
            }
            return self.advance(b);
        }

        // variable declarations at the top level of the main block
        if matches!(b, b'@' | b'%' | b':' | b';' | b'-')
            && page.arena.get(self.block).kind == "main"
            && self.last != b'['
        {
            return self.variable_byte(b, page);
        }

        self.handle_byte(b, page)
    }

    /// Default content handling: terminate or validate the catch, then
    /// append the byte.
    pub(crate) fn handle_byte(&mut self, b: u8, page: &mut Page) -> Result<(), ParseError> {
        if self.top_catch().should_skip_byte(b) {
            // flush the terminated catch, prefix included, into its parent
            if let Some(Catch::VariableName {
                prefix, pos, buf, ..
            }) = self.catches.pop()
            {
                let mut runs = vec![PosContent {
                    content: Content::Text(prefix),
                    pos,
                }];
                runs.extend(buf.into_runs());
                self.top_buf(page).append_runs(runs);
            }
        } else if !self.top_catch().byte_ok(b) {
            return Err(self.invalid_byte_error(b as char));
        }

        // an escaped byte with no syntactic meaning keeps its backslash so
        // the formatter can handle the escape later
        let pos = self.pos;
        let mut add = String::new();
        if self.escape && !self.ignore {
            add.push('\\');
        }
        add.push(b as char);
        self.top_buf(page).append_text(&add, pos);

        self.advance(b)
    }

    /// Append a complete multi-byte UTF-8 sequence as content. The catch is
    /// asked about the lead byte only.
    fn handle_text(&mut self, seq: &str, page: &mut Page) -> Result<(), ParseError> {
        let lead = seq.as_bytes()[0];
        if !self.top_catch().byte_ok(lead) {
            let shown = seq.chars().next().unwrap_or('\u{fffd}');
            return Err(self.invalid_byte_error(shown));
        }

        let pos = self.pos;
        let mut add = String::new();
        if self.escape && !self.ignore {
            add.push('\\');
        }
        add.push_str(seq);
        self.top_buf(page).append_text(&add, pos);

        self.advance(lead)
    }

    fn invalid_byte_error(&self, shown: char) -> ParseError {
        let shown = if shown == '\n' {
            "\u{2424}".to_string()
        } else {
            shown.to_string()
        };
        ParseError::new(
            format!(
                "invalid byte '{}' in {}",
                shown,
                self.top_catch().kind_name()
            ),
            self.pos,
        )
    }

    /// Advance past the current byte.
    pub(crate) fn advance(&mut self, b: u8) -> Result<(), ParseError> {
        self.ignore = false;
        self.last = b;
        self.escape = b == b'\\' && !self.escape && self.brace_level == 0;
        Ok(())
    }

    pub(crate) fn top_catch(&self) -> &Catch {
        self.catches.last().expect("catch stack is never empty")
    }

    /// The content buffer of the current catch.
    pub(crate) fn top_buf<'a>(
        &'a mut self,
        page: &'a mut Page,
    ) -> &'a mut crate::catch::ContentBuf {
        match self.catches.last_mut().expect("catch stack is never empty") {
            Catch::Block(id) | Catch::BraceEscape(id) => &mut page.arena.get_mut(*id).buf,
            Catch::VariableName { buf, .. } | Catch::VariableValue { buf, .. } => buf,
        }
    }

    /// Verify the source ended cleanly: no open comment, brace escape,
    /// variable declaration, or block.
    pub fn finish(&mut self, page: &Page) -> Result<(), ParseError> {
        if self.brace_level != 0 {
            return Err(ParseError::new("unclosed brace escape at end of input", self.pos));
        }
        if self.comment_level != 0 {
            return Err(ParseError::new("unclosed comment at end of input", self.pos));
        }
        if self.catches.len() > 1 {
            let (kind, pos) = match self.top_catch() {
                Catch::Block(id) => ("block", page.arena.get(*id).open_pos),
                Catch::BraceEscape(id) => ("brace escape", page.arena.get(*id).open_pos),
                Catch::VariableName { pos, .. } => ("variable name", *pos),
                Catch::VariableValue { pos, .. } => ("variable value", *pos),
            };
            return Err(ParseError::new(format!("unclosed {} at end of input", kind), pos));
        }
        Ok(())
    }
}

// sequence length from the lead byte; the input is a valid &str
fn utf8_len(lead: u8) -> usize {
    match lead {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_len() {
        assert_eq!(utf8_len("é".as_bytes()[0]), 2);
        assert_eq!(utf8_len("中".as_bytes()[0]), 3);
        assert_eq!(utf8_len("🦀".as_bytes()[0]), 4);
    }
}
