//! Parsed query string.

use std::collections::BTreeMap;

use serde::Serialize;
use url::form_urlencoded;

/// One query key: a single value, or every value in order when the key repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Multiple(Vec<String>),
}

impl QueryValue {
    pub fn first(&self) -> &str {
        match self {
            QueryValue::Single(value) => value,
            QueryValue::Multiple(values) => values.first().map(String::as_str).unwrap_or(""),
        }
    }

    pub fn all(&self) -> Vec<&str> {
        match self {
            QueryValue::Single(value) => vec![value.as_str()],
            QueryValue::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            QueryValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = QueryValue::Multiple(vec![first, value]);
            }
            QueryValue::Multiple(values) => values.push(value),
        }
    }
}

/// Decoded query parameters. Serializes as `{"key": "v"}` / `{"key": ["a", "b"]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Query(BTreeMap<String, QueryValue>);

impl Query {
    /// Parse a raw query string, with or without its leading `?`.
    pub fn parse(query_string: &str) -> Self {
        let raw = query_string.strip_prefix('?').unwrap_or(query_string);
        let mut entries: BTreeMap<String, QueryValue> = BTreeMap::new();

        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            match entries.get_mut(key.as_ref()) {
                Some(existing) => existing.push(value.into_owned()),
                None => {
                    entries.insert(key.into_owned(), QueryValue::Single(value.into_owned()));
                }
            }
        }

        Self(entries)
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(QueryValue::first)
    }

    /// Every value for `key`, in order of appearance.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.0.get(key).map(QueryValue::all).unwrap_or_default()
    }

    pub fn value(&self, key: &str) -> Option<&QueryValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_with_and_without_prefix() {
        assert_eq!(Query::parse("?a=1&b=two"), Query::parse("a=1&b=two"));
        let query = Query::parse("?a=1&b=two");
        assert_eq!(query.get("a"), Some("1"));
        assert_eq!(query.get("b"), Some("two"));
        assert_eq!(query.get("c"), None);
    }

    #[test]
    fn test_repeated_keys() {
        let query = Query::parse("tag=a&tag=b&tag=c&x=1");
        assert_eq!(query.get_all("tag"), vec!["a", "b", "c"]);
        assert_eq!(query.get("tag"), Some("a"));
        assert_eq!(query.len(), 2);
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"tag": ["a", "b", "c"], "x": "1"})
        );
    }

    #[test]
    fn test_decoding() {
        let query = Query::parse("q=hello+world&path=%2Fa%2Fb&flag");
        assert_eq!(query.get("q"), Some("hello world"));
        assert_eq!(query.get("path"), Some("/a/b"));
        assert_eq!(query.get("flag"), Some(""));
    }

    #[test]
    fn test_empty() {
        assert!(Query::parse("").is_empty());
        assert!(Query::parse("?").is_empty());
    }
}
