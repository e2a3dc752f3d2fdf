//! Page metadata: title, attributes and head/body tags.
//!
//! Metadata comes from three layers that are merged in order: the global
//! metadata held by the compiler (configured `[meta]` plus the stylesheet
//! link or inline style), framework plugins, then the component itself.

mod template;

pub use template::Scaffold;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable id of the inline style tag carrying the compiled stylesheet.
pub const COMPILED_STYLE_ID: &str = "pronto-compiled";

/// Metadata describing the page around a rendered body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaInfo {
    pub title: Option<String>,
    #[serde(alias = "htmlAttrs")]
    pub html_attrs: BTreeMap<String, Value>,
    #[serde(alias = "bodyAttrs")]
    pub body_attrs: BTreeMap<String, Value>,
    pub meta: Vec<Tag>,
    pub link: Vec<Tag>,
    pub style: Vec<Tag>,
    pub script: Vec<Tag>,
    pub noscript: Vec<Tag>,
}

/// The tag lists of [`MetaInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Meta,
    Link,
    Style,
    Script,
    Noscript,
}

/// One head (or body) tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    /// Explicit identity; tags with the same id replace each other.
    #[serde(alias = "hid", skip_serializing_if = "Option::is_none")]
    pub vmid: Option<String>,
    /// Scripts only: emit before `</body>` instead of in `<head>`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub body: bool,
    /// Inner text of `style`, `script` and `noscript` tags; the `content`
    /// attribute of `meta` tags.
    #[serde(
        alias = "cssText",
        alias = "innerHTML",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<String>,
    #[serde(flatten)]
    pub attrs: BTreeMap<String, Value>,
}

impl Tag {
    /// `<link rel="stylesheet" href=...>`
    pub fn stylesheet(href: &str) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("rel".to_string(), Value::from("stylesheet"));
        attrs.insert("href".to_string(), Value::from(href));
        Self {
            attrs,
            ..Self::default()
        }
    }

    /// `<style type="text/css">` carrying `css`, identified by `vmid`.
    pub fn inline_style(vmid: &str, css: &str) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("type".to_string(), Value::from("text/css"));
        Self {
            vmid: Some(vmid.to_string()),
            content: Some(css.to_string()),
            attrs,
            ..Self::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Value::as_str)
    }

    /// Identity used when merging lists. Tags without one always append.
    fn identity(&self, kind: TagKind) -> Option<(&'static str, &str)> {
        if let Some(vmid) = &self.vmid {
            return Some(("vmid", vmid));
        }
        let keys: &[&'static str] = match kind {
            TagKind::Link => &["href"],
            TagKind::Script => &["src"],
            TagKind::Meta => &["name", "property", "http-equiv", "charset"],
            TagKind::Style | TagKind::Noscript => &[],
        };
        keys.iter().find_map(|key| {
            let value = self.attr(key)?;
            // `charset` carries no value identity: one per page
            Some((*key, if *key == "charset" { "" } else { value }))
        })
    }
}

impl MetaInfo {
    pub fn tags(&self, kind: TagKind) -> &[Tag] {
        match kind {
            TagKind::Meta => &self.meta,
            TagKind::Link => &self.link,
            TagKind::Style => &self.style,
            TagKind::Script => &self.script,
            TagKind::Noscript => &self.noscript,
        }
    }

    fn tags_mut(&mut self, kind: TagKind) -> &mut Vec<Tag> {
        match kind {
            TagKind::Meta => &mut self.meta,
            TagKind::Link => &mut self.link,
            TagKind::Style => &mut self.style,
            TagKind::Script => &mut self.script,
            TagKind::Noscript => &mut self.noscript,
        }
    }

    /// Insert `tag`, replacing in place any tag with the same identity.
    pub fn merge_tag(&mut self, kind: TagKind, tag: Tag) {
        let list = self.tags_mut(kind);
        let slot = tag
            .identity(kind)
            .and_then(|id| list.iter().position(|t| t.identity(kind) == Some(id)));
        match slot {
            Some(i) => list[i] = tag,
            None => list.push(tag),
        }
    }

    /// Layer `over` on top of `self`.
    ///
    /// Scalars and attributes from `over` win; tag lists merge by identity.
    pub fn merge(&self, over: &MetaInfo) -> MetaInfo {
        let mut merged = self.clone();
        if over.title.is_some() {
            merged.title.clone_from(&over.title);
        }
        merged
            .html_attrs
            .extend(over.html_attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
            .body_attrs
            .extend(over.body_attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
        for kind in [
            TagKind::Meta,
            TagKind::Link,
            TagKind::Style,
            TagKind::Script,
            TagKind::Noscript,
        ] {
            for tag in over.tags(kind) {
                merged.merge_tag(kind, tag.clone());
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stylesheet_link_dedupes_by_href() {
        let mut meta = MetaInfo::default();
        meta.merge_tag(TagKind::Link, Tag::stylesheet("/css/style.css"));
        meta.merge_tag(TagKind::Link, Tag::stylesheet("/css/style.css"));
        meta.merge_tag(TagKind::Link, Tag::stylesheet("/css/other.css"));
        assert_eq!(meta.link.len(), 2);
    }

    #[test]
    fn test_inline_style_replaced_by_vmid() {
        let mut meta = MetaInfo::default();
        meta.merge_tag(TagKind::Style, Tag::inline_style(COMPILED_STYLE_ID, "a{}"));
        meta.merge_tag(TagKind::Style, Tag::inline_style(COMPILED_STYLE_ID, "b{}"));
        assert_eq!(meta.style.len(), 1);
        assert_eq!(meta.style[0].content.as_deref(), Some("b{}"));
    }

    #[test]
    fn test_untagged_styles_append() {
        let mut meta = MetaInfo::default();
        let tag = Tag {
            content: Some("p{}".into()),
            ..Tag::default()
        };
        meta.merge_tag(TagKind::Style, tag.clone());
        meta.merge_tag(TagKind::Style, tag);
        assert_eq!(meta.style.len(), 2);
    }

    #[test]
    fn test_merge_layers() {
        let global: MetaInfo = serde_json::from_value(json!({
            "title": "Site",
            "htmlAttrs": {"lang": "en"},
            "meta": [{"charset": "utf-8"}, {"name": "description", "content": "global"}],
            "link": [{"rel": "stylesheet", "href": "/css/style.css"}],
        }))
        .unwrap();
        let component: MetaInfo = serde_json::from_value(json!({
            "title": "Home",
            "meta": [{"name": "description", "content": "home"}],
            "script": [{"src": "/app.js", "body": true}],
        }))
        .unwrap();

        let merged = global.merge(&component);
        assert_eq!(merged.title.as_deref(), Some("Home"));
        assert_eq!(merged.html_attrs["lang"], json!("en"));
        assert_eq!(merged.meta.len(), 2);
        assert_eq!(merged.meta[1].content.as_deref(), Some("home"));
        assert_eq!(merged.link.len(), 1);
        assert!(merged.script[0].body);
    }

    #[test]
    fn test_merge_keeps_title_when_absent() {
        let global = MetaInfo {
            title: Some("Site".into()),
            ..MetaInfo::default()
        };
        let merged = global.merge(&MetaInfo::default());
        assert_eq!(merged.title.as_deref(), Some("Site"));
    }

    #[test]
    fn test_content_aliases() {
        let tag: Tag = serde_json::from_value(json!({"cssText": "p{}", "type": "text/css"})).unwrap();
        assert_eq!(tag.content.as_deref(), Some("p{}"));
        assert_eq!(tag.attr("type"), Some("text/css"));
        assert!(!tag.attrs.contains_key("cssText"));
    }
}
