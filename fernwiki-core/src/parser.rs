//! The block-parser half of [`Parser`](crate::lexer::Parser): block header
//! scanning, open/close handling, and variable declarations.

use crate::catch::{Catch, Content, ContentBuf};
use crate::lexer::{ParseError, Parser};
use crate::page::Page;
use crate::scope::Value;
use crate::tree::{BlockId, BlockNode};

impl Parser {
    /// Handle `{`: scan the header out of the preceding text, create the
    /// child block, and enter brace-escape mode when the next byte is `{`.
    pub(crate) fn open_block(&mut self, page: &mut Page) -> Result<(), ParseError> {
        // {@name}: splice a block-valued variable
        if self.next == b'@' {
            self.skip = true;
            let id = page
                .arena
                .push(BlockNode::new("variable", Some(self.block), self.pos));
            self.catches.push(Catch::Block(id));
            self.block = id;
            return Ok(());
        }

        let (kind, name, classes) = self.scan_header(page);
        tracing::debug!(kind = %kind, pos = %self.pos, "open block");

        let mut node = BlockNode::new(&kind, Some(self.block), self.pos);
        node.name = name;
        node.classes = classes;
        let id = page.arena.push(node);
        self.catches.push(Catch::Block(id));
        self.block = id;

        // name{{ … }} enters a brace-escape region
        if self.next == b'{' {
            self.brace_first = true;
            self.brace_level = 1;
            self.catches.push(Catch::BraceEscape(id));
        }
        Ok(())
    }

    /// Scan backward over the catch's trailing text for `[classes.]type[name]`,
    /// stripping the consumed header characters from the catch.
    fn scan_header(&mut self, page: &mut Page) -> (String, Option<String>, Vec<String>) {
        let last = self
            .top_buf(page)
            .last_string()
            .unwrap_or_default()
            .to_string();
        let chars: Vec<char> = last.chars().collect();

        let mut block_type = String::new();
        let mut block_name = String::new();
        let mut in_name = 0i32;
        let mut scanned = 0usize;

        for i in (0..chars.len()).rev() {
            let c = chars[i];
            scanned += 1;

            if c == ']' {
                in_name += 1;
                if in_name == 1 {
                    continue;
                }
            } else if c == '[' {
                in_name -= 1;
                if in_name != 1 {
                    continue;
                }
            }

            if in_name != 0 {
                // inside the [name], nested brackets included
                block_name.insert(0, c);
            } else if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '$' | '.') {
                block_type.insert(0, c);
            } else if c == '~' && !block_type.is_empty() {
                // tilde terminates the type, allowing adjacent text
                break;
            } else if c.is_whitespace() && block_type.is_empty() {
                continue;
            } else {
                // not part of the header; give the character back
                scanned -= 1;
                break;
            }
        }

        let keep: String = chars[..chars.len() - scanned].iter().collect();
        self.top_buf(page).set_last_string(keep);

        // type.class.class
        let mut classes = Vec::new();
        if block_type.contains('.') {
            let mut split = block_type.split('.');
            let head = split.next().unwrap_or_default().to_string();
            classes = split.map(str::to_string).collect();
            block_type = head;
        }

        // untyped blocks are maps
        if block_type.is_empty() {
            block_type = "map".to_string();
        }

        // $name is shorthand for a model
        if let Some(model) = block_type.strip_prefix('$') {
            block_name = model.to_string();
            block_type = "model".to_string();
        }

        let name = if block_name.is_empty() {
            None
        } else {
            Some(block_name)
        };
        (block_type, name, classes)
    }

    /// Handle `}`: close the current block and hand the reference to the
    /// parent catch. Closing the main block is a structural error.
    pub(crate) fn close_block(&mut self, page: &mut Page) -> Result<(), ParseError> {
        let closed = self.block;
        if page.arena.get(closed).kind == "main" {
            return Err(ParseError::new("attempted to close the main block", self.pos));
        }

        {
            let node = page.arena.get_mut(closed);
            node.closed = true;
            node.close_pos = self.pos;
        }
        self.catches.pop();
        self.block = page
            .arena
            .get(closed)
            .parent
            .expect("non-main block always has a parent");

        let pos = self.pos;
        if page.arena.get(closed).kind == "variable" {
            // {@name}: splice the variable's block value in place; block
            // references only resolve within this page's own scope
            let name = page.arena.get(closed).buf.text().trim().to_string();
            let looked: Result<Option<BlockId>, String> =
                page.scope().get_own_block(&name).map_err(|e| e.to_string());
            match looked {
                Ok(Some(value)) => self.top_buf(page).push_child(value, pos),
                Ok(None) => page.warn(pos, format!("@{}: not defined", name)),
                Err(e) => page.warn(pos, e),
            }
        } else {
            self.top_buf(page).push_child(closed, pos);
        }
        Ok(())
    }

    /// Handle `@`, `%`, `:`, `;`, `-` at the top level of the main block.
    pub(crate) fn variable_byte(&mut self, b: u8, page: &mut Page) -> Result<(), ParseError> {
        self.ignore = true;
        if self.escape {
            return self.handle_byte(b, page);
        }

        let at_top = matches!(self.catches.last(), Some(Catch::Block(id)) if *id == self.block);

        match b {
            // entering a variable declaration
            b'@' | b'%' if at_top => {
                let negated = self.last == b'-';
                let mut prefix = String::new();
                if negated {
                    prefix.push('-');
                }
                prefix.push(b as char);
                self.catches.push(Catch::VariableName {
                    prefix,
                    pos: self.pos,
                    buf: ContentBuf::new(),
                    not_interpolated: b == b'%',
                    negated,
                });
                self.advance(b)
            }

            // starts a variable value
            b':' if matches!(self.catches.last(), Some(Catch::VariableName { .. })) => {
                self.start_variable_value()?;
                self.advance(b)
            }

            // ends a variable name (boolean) or value
            b';' if matches!(
                self.catches.last(),
                Some(Catch::VariableName { .. } | Catch::VariableValue { .. })
            ) =>
            {
                self.finish_variable(page)?;
                self.advance(b)
            }

            // the `-` of `-@name`; the negation is picked up from `last`
            b'-' if at_top && (self.next == b'@' || self.next == b'%') => self.advance(b),

            _ => self.handle_byte(b, page),
        }
    }

    fn start_variable_value(&mut self) -> Result<(), ParseError> {
        if let Some(Catch::VariableName {
            pos,
            buf,
            not_interpolated,
            negated,
            ..
        }) = self.catches.pop()
        {
            if buf.has_children() {
                return Err(ParseError::new("variable name cannot contain a block", pos));
            }
            let name = buf.text();
            if name.is_empty() {
                return Err(ParseError::new("variable has no name", self.pos));
            }
            self.catches.push(Catch::VariableValue {
                name,
                pos,
                buf: ContentBuf::new(),
                not_interpolated,
                negated,
            });
        }
        Ok(())
    }

    fn finish_variable(&mut self, page: &mut Page) -> Result<(), ParseError> {
        match self.catches.pop() {
            // @name; — boolean
            Some(Catch::VariableName {
                pos, buf, negated, ..
            }) => {
                if buf.has_children() {
                    return Err(ParseError::new("variable name cannot contain a block", pos));
                }
                let name = buf.text();
                if name.is_empty() {
                    return Err(ParseError::new("variable has no name", self.pos));
                }
                page.scope_mut()
                    .set(&name, Value::Bool(!negated))
                    .map_err(|e| ParseError::new(e.to_string(), pos))?;
            }

            // @name: value;
            Some(Catch::VariableValue {
                name,
                pos,
                buf,
                not_interpolated,
                negated,
            }) => {
                let mut text = String::new();
                let mut children = Vec::new();
                for run in buf.into_runs() {
                    match run.content {
                        Content::Text(s) => text.push_str(&s),
                        Content::Child(id) => children.push(id),
                    }
                }
                let trimmed = text.trim().to_string();

                if children.len() > 1 || (!children.is_empty() && !trimmed.is_empty()) {
                    return Err(ParseError::new(
                        "variable cannot contain both text and blocks",
                        pos,
                    ));
                }

                let value = if let Some(&block) = children.first() {
                    if negated {
                        page.warn(pos, format!("@{}: cannot negate a block value", name));
                        Value::Bool(false)
                    } else {
                        crate::blocks::parse(page, block);
                        Value::Block(block)
                    }
                } else if negated {
                    Value::Bool(trimmed.is_empty())
                } else if not_interpolated {
                    Value::Str(trimmed)
                } else {
                    let html =
                        crate::format::format_text(page, &trimmed, &crate::format::FmtOpts::at(pos));
                    Value::Html(html)
                };

                page.scope_mut()
                    .set(&name, value)
                    .map_err(|e| ParseError::new(e.to_string(), pos))?;
            }

            other => {
                if let Some(catch) = other {
                    self.catches.push(catch);
                }
            }
        }
        Ok(())
    }
}
