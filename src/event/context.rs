//! Per-request context bag.
//!
//! # Responsibilities
//! - Hold values derived while handling one request (route params, sessions,
//!   client address overrides, request id)
//! - Typed access over string keys
//!
//! # Design Decisions
//! - Keys are strings so unrelated layers can agree on names without sharing types
//! - Values are `Any` so each layer keeps its own types; a lookup with the wrong
//!   type behaves like a missing key

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Route parameters (`HashMap<String, String>`).
pub const PARAMS: &str = "params";

/// Matched route pattern (`String`).
pub const MATCHED_ROUTE: &str = "matched_route";

/// Client address override (`String`), preferred by [`crate::event::Event::ip`].
pub const CLIENT_ADDRESS: &str = "client_address";

/// Request correlation id (`String`).
pub const REQUEST_ID: &str = "request_id";

/// Open string-keyed bag of per-request values.
#[derive(Default)]
pub struct Context {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing whatever was under `key`.
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.values.insert(key.into(), Box::new(value));
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Remove and return the value under `key` if it has type `T`.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.values.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.values
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Context").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let mut ctx = Context::new();
        assert!(ctx.is_empty());

        ctx.insert(CLIENT_ADDRESS, "10.0.0.1".to_string());
        ctx.insert("count", 3u32);

        assert_eq!(ctx.get::<String>(CLIENT_ADDRESS).map(String::as_str), Some("10.0.0.1"));
        assert_eq!(ctx.get::<u32>("count"), Some(&3));
        assert_eq!(ctx.get::<u64>("count"), None);

        if let Some(count) = ctx.get_mut::<u32>("count") {
            *count += 1;
        }
        assert_eq!(ctx.get::<u32>("count"), Some(&4));
    }

    #[test]
    fn test_remove_keeps_mismatched_type() {
        let mut ctx = Context::new();
        ctx.insert("value", 1u8);
        assert_eq!(ctx.remove::<String>("value"), None);
        assert!(ctx.contains_key("value"));
        assert_eq!(ctx.remove::<u8>("value"), Some(1));
        assert!(!ctx.contains_key("value"));
    }
}
