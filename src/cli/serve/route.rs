//! Request URL to view name and query state.

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

/// A page request: `/blog/post?tag=rust` is view `blog/post` with
/// query `{"tag": "rust"}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub view: String,
    pub query: Map<String, Value>,
}

impl Route {
    /// `None` for paths that cannot name a view (`..` segments, bad UTF-8).
    pub fn parse(url: &str) -> Option<Self> {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        let path = percent_decode_str(path).decode_utf8().ok()?;
        let path = path.trim_matches('/');

        if path.split('/').any(|segment| segment == ".." || segment == ".") {
            return None;
        }
        let view = if path.is_empty() { "index" } else { path };

        let query = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();

        Some(Self {
            view: view.to_string(),
            query,
        })
    }

    /// Request state handed to the component.
    pub fn state(&self) -> Value {
        let mut state = Map::new();
        state.insert("query".to_string(), Value::Object(self.query.clone()));
        Value::Object(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_is_index() {
        let route = Route::parse("/").unwrap();
        assert_eq!(route.view, "index");
        assert!(route.query.is_empty());
    }

    #[test]
    fn test_nested_view_with_query() {
        let route = Route::parse("/a/b?x=1&name=J%C3%BCrgen+K").unwrap();
        assert_eq!(route.view, "a/b");
        assert_eq!(route.state(), json!({"query": {"x": "1", "name": "Jürgen K"}}));
    }

    #[test]
    fn test_trailing_slash_and_encoding() {
        let route = Route::parse("/blog/my%20post/").unwrap();
        assert_eq!(route.view, "blog/my post");
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(Route::parse("/../secret").is_none());
        assert!(Route::parse("/a/%2E%2E/b").is_none());
    }
}
