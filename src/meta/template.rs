//! Head/tail page scaffolding.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde_json::Value;

use super::{MetaInfo, Tag, TagKind};
use crate::utils::html::{escape, escape_attr, guard_raw_text};

/// Markup wrapped around a rendered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaffold {
    pub head: String,
    pub tail: String,
}

impl Scaffold {
    /// Lay out the page for `meta`:
    ///
    /// ```text
    /// <!DOCTYPE html>
    /// <html {html_attrs}>
    /// <head>
    /// {meta}  {title}  {link}  {style}  {head scripts}  {noscript}   (one per line)
    /// </head>
    /// <body {body_attrs}>
    ///   BODY
    /// {body scripts}</body>
    /// </html>
    /// ```
    pub fn from_meta(meta: &MetaInfo) -> Self {
        let title = meta
            .title
            .as_deref()
            .map(|t| format!("<title>{}</title>", escape(t)))
            .unwrap_or_default();

        let head = format!(
            "<!DOCTYPE html>\n<html {}>\n<head>\n{}\n{}\n{}\n{}\n{}\n{}\n</head>\n<body {}>\n  ",
            render_attrs(&meta.html_attrs),
            render_tags(TagKind::Meta, &meta.meta, |_| true),
            title,
            render_tags(TagKind::Link, &meta.link, |_| true),
            render_tags(TagKind::Style, &meta.style, |_| true),
            render_tags(TagKind::Script, &meta.script, |t| !t.body),
            render_tags(TagKind::Noscript, &meta.noscript, |_| true),
            render_attrs(&meta.body_attrs),
        );

        let tail = format!(
            "\n{}</body>\n</html>",
            render_tags(TagKind::Script, &meta.script, |t| t.body)
        );

        Self { head, tail }
    }

    /// Wrap a complete body.
    pub fn wrap(&self, body: &str) -> String {
        let mut page = String::with_capacity(self.head.len() + body.len() + self.tail.len());
        page.push_str(&self.head);
        page.push_str(body);
        page.push_str(&self.tail);
        page
    }
}

fn render_tags(kind: TagKind, tags: &[Tag], keep: impl Fn(&Tag) -> bool) -> String {
    let name = match kind {
        TagKind::Meta => "meta",
        TagKind::Link => "link",
        TagKind::Style => "style",
        TagKind::Script => "script",
        TagKind::Noscript => "noscript",
    };

    let mut out = String::new();
    for tag in tags.iter().filter(|t| keep(t)) {
        let attrs = render_attrs(&tag.attrs);
        let sep = if attrs.is_empty() { "" } else { " " };
        match kind {
            TagKind::Meta => {
                let content = tag
                    .content
                    .as_deref()
                    .map(|c| format!(" content=\"{}\"", escape_attr(c)))
                    .unwrap_or_default();
                let _ = write!(out, "<meta{sep}{attrs}{content}>");
            }
            TagKind::Link => {
                let _ = write!(out, "<link{sep}{attrs}>");
            }
            TagKind::Style | TagKind::Script => {
                let inner = guard_raw_text(tag.content.as_deref().unwrap_or(""), name);
                let _ = write!(out, "<{name}{sep}{attrs}>{inner}</{name}>");
            }
            TagKind::Noscript => {
                let inner = tag.content.as_deref().unwrap_or("");
                let _ = write!(out, "<noscript{sep}{attrs}>{inner}</noscript>");
            }
        }
    }
    out
}

/// `name="value"` pairs. `true` renders bare, `false`/`null` are dropped,
/// and names that cannot be attribute names are skipped.
fn render_attrs(attrs: &BTreeMap<String, Value>) -> String {
    let mut parts = Vec::with_capacity(attrs.len());
    for (name, value) in attrs {
        if !is_attr_name(name) {
            continue;
        }
        match value {
            Value::Null | Value::Bool(false) => {}
            Value::Bool(true) => parts.push(name.clone()),
            Value::String(s) => parts.push(format!("{name}=\"{}\"", escape_attr(s))),
            other => parts.push(format!("{name}=\"{}\"", escape_attr(&other.to_string()))),
        }
    }
    parts.join(" ")
}

fn is_attr_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '>' | '/' | '=' | '<'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_meta_layout() {
        let scaffold = Scaffold::from_meta(&MetaInfo::default());
        assert_eq!(
            scaffold.head,
            "<!DOCTYPE html>\n<html >\n<head>\n\n\n\n\n\n\n</head>\n<body >\n  "
        );
        assert_eq!(scaffold.tail, "\n</body>\n</html>");
    }

    #[test]
    fn test_full_layout() {
        let meta: MetaInfo = serde_json::from_value(json!({
            "title": "A & B",
            "htmlAttrs": {"lang": "en", "amp": true, "hidden": false},
            "bodyAttrs": {"class": "home"},
            "meta": [{"charset": "utf-8"}, {"name": "description", "content": "x\"y"}],
            "link": [{"rel": "stylesheet", "href": "/css/style.css"}],
            "style": [{"cssText": "p{}", "type": "text/css"}],
            "script": [
                {"src": "/head.js"},
                {"src": "/tail.js", "body": true}
            ],
            "noscript": [{"innerHTML": "enable js"}],
        }))
        .unwrap();
        let scaffold = Scaffold::from_meta(&meta);

        assert!(scaffold.head.starts_with("<!DOCTYPE html>\n<html amp lang=\"en\">\n<head>\n"));
        assert!(scaffold.head.contains(
            "<meta charset=\"utf-8\"><meta name=\"description\" content=\"x&quot;y\">\n<title>A &amp; B</title>\n"
        ));
        assert!(scaffold.head.contains("<link href=\"/css/style.css\" rel=\"stylesheet\">\n"));
        assert!(scaffold.head.contains("<style type=\"text/css\">p{}</style>\n"));
        assert!(scaffold.head.contains("<script src=\"/head.js\"></script>\n<noscript>enable js</noscript>\n</head>"));
        assert!(scaffold.head.ends_with("<body class=\"home\">\n  "));
        assert!(!scaffold.head.contains("tail.js"));
        assert_eq!(scaffold.tail, "\n<script src=\"/tail.js\"></script></body>\n</html>");
    }

    #[test]
    fn test_raw_text_is_guarded() {
        let meta = MetaInfo {
            style: vec![Tag::inline_style("x", "</style><script>alert(1)</script>")],
            ..MetaInfo::default()
        };
        let scaffold = Scaffold::from_meta(&meta);
        assert!(!scaffold.head.contains("</style><script>"));
    }

    #[test]
    fn test_bad_attribute_names_skipped() {
        let mut attrs = BTreeMap::new();
        attrs.insert("onload=\"x\"".to_string(), json!("y"));
        attrs.insert("data-n".to_string(), json!(3));
        assert_eq!(render_attrs(&attrs), "data-n=\"3\"");
    }

    #[test]
    fn test_wrap() {
        let scaffold = Scaffold {
            head: "<html><head></head><body>".into(),
            tail: "</body></html>".into(),
        };
        assert_eq!(
            scaffold.wrap("<div>A</div>"),
            "<html><head></head><body><div>A</div></body></html>"
        );
    }
}
