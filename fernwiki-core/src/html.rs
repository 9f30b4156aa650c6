//! Minimal HTML element tree used by block html generation.

use std::fmt::Write;

/// Content inside an element: escaped text, raw HTML, or a child element.
#[derive(Debug, Clone)]
pub enum ElementContent {
    Text(String),
    Html(String),
    Child(Element),
}

/// One HTML element with attributes and ordered content.
#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    attrs: Vec<(String, String)>,
    content: Vec<ElementContent>,
    /// Render content only, without the wrapping tags.
    pub no_tags: bool,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            id: None,
            classes: Vec::new(),
            attrs: Vec::new(),
            content: Vec::new(),
            no_tags: false,
        }
    }

    /// An invisible container that renders only its content.
    pub fn container() -> Self {
        let mut el = Self::new("div");
        el.no_tags = true;
        el
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn add_class(&mut self, class: &str) {
        self.classes.push(class.to_string());
    }

    pub fn set_id(&mut self, id: &str) {
        self.id = Some(id.to_string());
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        self.attrs.push((name.to_string(), value.to_string()));
    }

    /// Append text, entity-encoded at generation time.
    pub fn add_text(&mut self, text: &str) {
        self.content.push(ElementContent::Text(text.to_string()));
    }

    /// Append pre-rendered HTML verbatim.
    pub fn add_html(&mut self, html: &str) {
        self.content.push(ElementContent::Html(html.to_string()));
    }

    pub fn add_child(&mut self, child: Element) {
        self.content.push(ElementContent::Child(child));
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Render the element and its subtree to HTML.
    pub fn generate(&self) -> String {
        let mut out = String::new();
        self.generate_into(&mut out);
        out
    }

    fn generate_into(&self, out: &mut String) {
        if !self.no_tags {
            out.push('<');
            out.push_str(&self.tag);
            if let Some(id) = &self.id {
                let _ = write!(out, " id=\"{}\"", escape_attr(id));
            }
            if !self.classes.is_empty() {
                let _ = write!(out, " class=\"{}\"", escape_attr(&self.classes.join(" ")));
            }
            for (name, value) in &self.attrs {
                let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
            }
            if is_void(&self.tag) && self.content.is_empty() {
                out.push_str(" />");
                return;
            }
            out.push('>');
        }

        for item in &self.content {
            match item {
                ElementContent::Text(s) => out.push_str(&escape_html(s)),
                ElementContent::Html(s) => out.push_str(s),
                ElementContent::Child(child) => child.generate_into(out),
            }
        }

        if !self.no_tags {
            let _ = write!(out, "</{}>", self.tag);
        }
    }
}

fn is_void(tag: &str) -> bool {
    matches!(tag, "img" | "br" | "hr" | "meta" | "link" | "input")
}

/// Entity-encode text content.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn escape_attr(s: &str) -> String {
    escape_html(s)
}

/// Strip HTML tags, leaving text content. Used for plain-text search
/// artifacts and unformatted titles.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
