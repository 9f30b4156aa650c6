//! `code [lang]{}` — escaped, unformatted content.

use crate::html::Element;
use crate::page::Page;
use crate::tree::BlockId;

pub fn html(page: &mut Page, id: BlockId) -> Element {
    let node = page.arena.get(id);
    let language = node
        .name
        .clone()
        .or_else(|| node.classes.first().cloned());

    let text = node.buf.text();
    let text = text.strip_prefix('\n').unwrap_or(&text);

    let mut pre = Element::new("pre");
    let mut code = Element::new("code");
    if let Some(lang) = language {
        code.add_class(&format!("language-{}", lang));
    }
    code.add_text(text);
    pre.add_child(code);
    pre
}

#[cfg(test)]
mod tests {
    use crate::page::Page;

    fn render(source: &str) -> String {
        let mut page = Page::from_source(source, Default::default());
        page.parse().expect("parse failed");
        page.html()
    }

    #[test]
    fn test_escaped_content() {
        let html = render("code { a <b> & c }");
        assert!(html.contains("a &lt;b&gt; &amp; c"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn test_language_from_name() {
        let html = render("code [go]{ x := 1 }");
        assert!(html.contains("class=\"language-go\""));
    }

    #[test]
    fn test_brace_escape_keeps_inner_braces() {
        let html = render("code [go]{{ if x { y } }}");
        assert!(html.contains("if x { y }"));
    }

    #[test]
    fn test_formatting_tokens_left_alone() {
        let html = render("code { [b]literal[/b] }");
        assert!(html.contains("[b]literal[/b]"));
    }
}
