//! Inline text formatting.
//!
//! Runs over each raw text run during HTML generation, turning `[b]`-style
//! tags, `[[label|target]]` links, and `[@var]` interpolations into HTML.
//! Everything else is entity-encoded unless the options say otherwise.

use crate::html::escape_html;
use crate::page::Page;
use crate::position::Position;
use crate::scope::Value;

/// Formatter options for one pass.
#[derive(Debug, Clone, Default)]
pub struct FmtOpts {
    /// Position of the text run, used for warnings.
    pub pos: Position,
    /// Disable entity encoding of plain text.
    pub no_entities: bool,
}

impl FmtOpts {
    pub fn at(pos: Position) -> Self {
        Self {
            pos,
            no_entities: false,
        }
    }
}

/// Format a text run into HTML.
pub fn format_text(page: &mut Page, text: &str, opts: &FmtOpts) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut plain = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        // backslash escapes reinjected by the lexer
        if c == '\\' && i + 1 < chars.len() {
            plain.push(chars[i + 1]);
            i += 2;
            continue;
        }

        if c == '[' {
            if chars.get(i + 1) == Some(&'[') {
                // [[ label | target ]]
                if let Some(end) = find_seq(&chars, i + 2, ']', ']') {
                    flush(&mut out, &mut plain, opts);
                    let inner: String = chars[i + 2..end].iter().collect();
                    out.push_str(&render_link(page, &inner, opts));
                    i = end + 2;
                    continue;
                }
            } else if let Some(end) = find_char(&chars, i + 1, ']') {
                let token: String = chars[i + 1..end].iter().collect();
                if let Some(html) = render_token(page, &token, opts) {
                    flush(&mut out, &mut plain, opts);
                    out.push_str(&html);
                    i = end + 1;
                    continue;
                }
                // unknown token: fall through as literal text
            }
        }

        plain.push(c);
        i += 1;
    }

    flush(&mut out, &mut plain, opts);
    out
}

fn flush(out: &mut String, plain: &mut String, opts: &FmtOpts) {
    if plain.is_empty() {
        return;
    }
    if opts.no_entities {
        out.push_str(plain);
    } else {
        out.push_str(&escape_html(plain));
    }
    plain.clear();
}

fn render_token(page: &mut Page, token: &str, opts: &FmtOpts) -> Option<String> {
    match token {
        "b" => return Some("<b>".into()),
        "/b" => return Some("</b>".into()),
        "i" => return Some("<i>".into()),
        "/i" => return Some("</i>".into()),
        "s" => return Some("<s>".into()),
        "/s" => return Some("</s>".into()),
        "c" => return Some("<code>".into()),
        "/c" => return Some("</code>".into()),
        "nl" | "br" => return Some("<br />".into()),
        _ => {}
    }

    // [@var] interpolation
    if let Some(name) = token.strip_prefix('@') {
        let name = name.trim().to_string();
        let looked: Result<Option<Value>, String> = page
            .scope()
            .get(&name)
            .map(|v| v.cloned())
            .map_err(|e| e.to_string());
        return Some(match looked {
            Ok(Some(Value::Html(s))) => s,
            Ok(Some(Value::Str(s))) => escape_html(&s),
            Ok(Some(other)) => {
                page.warn(
                    opts.pos,
                    format!("@{}: expected string, found {}", name, other.type_name()),
                );
                String::new()
            }
            Ok(None) => {
                page.warn(opts.pos, format!("@{}: not defined", name));
                String::new()
            }
            Err(e) => {
                page.warn(opts.pos, e);
                String::new()
            }
        });
    }

    // [html:…] raw passthrough, unsafe pages only
    if let Some(raw) = token.strip_prefix("html:") {
        if page.opt.unsafe_html {
            return Some(raw.to_string());
        }
        page.warn(opts.pos, "[html:] requires unsafe html".to_string());
        return Some(String::new());
    }

    None
}

fn render_link(page: &mut Page, inner: &str, opts: &FmtOpts) -> String {
    let (label, target) = match inner.split_once('|') {
        Some((l, t)) => (l.trim(), t.trim()),
        None => (inner.trim(), inner.trim()),
    };
    let label = if label.is_empty() { target } else { label };

    // external URL
    if target.contains("://") || target.starts_with("mailto:") {
        return anchor("external", target, label);
    }

    // category link
    if let Some(rest) = target.strip_prefix("category:") {
        let href = format!("{}/{}", page.opt.root.category, normalize_name(rest));
        return anchor("category", &href, label);
    }

    // external wiki reference, e.g. wp:Some Article
    if let Some((prefix, article)) = target.split_once(':') {
        if let Some(ext) = page.opt.external.get(prefix) {
            let href = format!("{}/{}", ext.root, ext.kind_escape(article.trim()));
            return anchor("external", &href, label);
        }
        page.warn(opts.pos, format!("no such external wiki '{}'", prefix));
        return escape_html(label);
    }

    // internal page
    let (name_part, fragment) = match target.split_once('#') {
        Some((n, f)) => (n, Some(f)),
        None => (target, None),
    };
    let name = normalize_name(name_part);
    let mut href = format!("{}/{}", page.opt.root.page, name);
    if let Some(frag) = fragment {
        href.push('#');
        href.push_str(&crate::blocks::heading_slug(frag));
    }
    if !name.is_empty() {
        page.record_page_ref(&format!("{}.page", name), opts.pos.line);
    }
    anchor("internal", &href, label)
}

impl crate::opt::ExternalWiki {
    fn kind_escape(&self, article: &str) -> String {
        match self.kind {
            crate::opt::ExternalType::MediaWiki => article.replace(' ', "_"),
            crate::opt::ExternalType::Plain => article.replace(' ', "%20"),
        }
    }
}

fn anchor(class: &str, href: &str, label: &str) -> String {
    format!(
        "<a class=\"wiki-link-{}\" href=\"{}\">{}</a>",
        class,
        escape_html(href),
        escape_html(label)
    )
}

/// Normalize a page-name link target: trimmed, no leading slash, no
/// extension, spaces as underscores.
pub fn normalize_name(target: &str) -> String {
    let name = target.trim().trim_start_matches('/');
    let name = name.strip_suffix(".page").unwrap_or(name);
    name.replace(' ', "_")
}

fn find_char(chars: &[char], from: usize, want: char) -> Option<usize> {
    (from..chars.len()).find(|&i| chars[i] == want)
}

fn find_seq(chars: &[char], from: usize, a: char, b: char) -> Option<usize> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == a && chars[i + 1] == b {
            return Some(i);
        }
        i += 1;
    }
    None
}
