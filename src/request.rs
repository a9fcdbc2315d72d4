//! Request model: a typed per-URL request record and its wire serialization.

use serde::Serialize;
use serde_json::{Map, Value};

/// One extraction request. `article_body_raw` defaults to `false` to override the server's
/// own default of `true`; `full_html` and `meta` are left unset unless the caller sets them.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub url: String,
    pub page_type: String,
    pub meta: Option<String>,
    pub article_body_raw: bool,
    pub full_html: Option<bool>,
    pub extra: Map<String, Value>,
}

impl Request {
    pub fn new(url: impl Into<String>, page_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            page_type: page_type.into(),
            meta: None,
            article_body_raw: false,
            full_html: None,
            extra: Map::new(),
        }
    }

    pub fn article(url: impl Into<String>) -> Self {
        Self::new(url, "article")
    }

    pub fn product(url: impl Into<String>) -> Self {
        Self::new(url, "product")
    }

    pub fn job_posting(url: impl Into<String>) -> Self {
        Self::new(url, "jobPosting")
    }

    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    pub fn with_full_html(mut self, full_html: bool) -> Self {
        self.full_html = Some(full_html);
        self
    }

    pub fn with_article_body_raw(mut self, article_body_raw: bool) -> Self {
        self.article_body_raw = article_body_raw;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Serialize to the wire form: drop unset optional fields, then merge `extra` last so its
    /// keys override any same-named field above. The `extra` key itself is never emitted.
    pub fn to_wire_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("url".to_string(), Value::String(self.url.clone()));
        map.insert("pageType".to_string(), Value::String(self.page_type.clone()));
        map.insert("articleBodyRaw".to_string(), Value::Bool(self.article_body_raw));
        if let Some(meta) = &self.meta {
            map.insert("meta".to_string(), Value::String(meta.clone()));
        }
        if let Some(full_html) = self.full_html {
            map.insert("fullHtml".to_string(), Value::Bool(full_html));
        }
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

impl Serialize for Request {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_wire_value().serialize(serializer)
    }
}

/// One item in a submitted query: either a typed [`Request`] or an already-serialized dict,
/// for callers who need fields the typed model doesn't expose.
#[derive(Debug, Clone)]
pub enum QueryItem {
    Typed(Request),
    Raw(Value),
}

impl QueryItem {
    pub fn to_wire_value(&self) -> Value {
        match self {
            QueryItem::Typed(req) => req.to_wire_value(),
            QueryItem::Raw(value) => value.clone(),
        }
    }
}

impl From<Request> for QueryItem {
    fn from(req: Request) -> Self {
        QueryItem::Typed(req)
    }
}

impl From<Value> for QueryItem {
    fn from(value: Value) -> Self {
        QueryItem::Raw(value)
    }
}

/// An ordered sequence of requests submitted together.
pub type Query = Vec<QueryItem>;

/// Serialize a full query to the JSON array the server expects as a POST body.
pub fn query_to_wire_values(query: &[QueryItem]) -> Vec<Value> {
    query.iter().map(QueryItem::to_wire_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_request_drops_unset_fields() {
        let req = Request::new("https://example.com", "article");
        assert_eq!(
            req.to_wire_value(),
            json!({"url": "https://example.com", "pageType": "article", "articleBodyRaw": false})
        );
    }

    #[test]
    fn full_request_merges_extra_last() {
        let req = Request::new("https://example.com", "article")
            .with_full_html(true)
            .with_meta("m")
            .with_extra("foo", "bar");
        assert_eq!(
            req.to_wire_value(),
            json!({
                "url": "https://example.com",
                "pageType": "article",
                "articleBodyRaw": false,
                "fullHtml": true,
                "meta": "m",
                "foo": "bar",
            })
        );
    }

    #[test]
    fn extra_overrides_named_field() {
        let req = Request::new("https://example.com", "article")
            .with_extra("pageType", "product");
        assert_eq!(
            req.to_wire_value()["pageType"],
            Value::String("product".to_string())
        );
    }

    #[test]
    fn raw_query_item_passes_through_untouched() {
        let raw = json!({"url": "https://example.com", "pageType": "article", "custom": 1});
        let item: QueryItem = raw.clone().into();
        assert_eq!(item.to_wire_value(), raw);
    }
}
