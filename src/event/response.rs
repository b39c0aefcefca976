//! Mutable response state accumulated on an event.
//!
//! Headers use `HeaderMap` semantics directly: `insert` replaces, `append` adds
//! a repeated entry (needed for `set-cookie`), `remove` deletes. Names are
//! case-insensitive.

use axum::http::{HeaderMap, StatusCode};

use crate::error::{sanitize_status_code, sanitize_status_message};

#[derive(Debug, Clone, Default)]
pub struct ResponseState {
    /// Status; 200 is applied at serialization time when unset.
    pub status: Option<StatusCode>,
    pub status_text: Option<String>,
    pub headers: HeaderMap,
}

impl ResponseState {
    /// Set status and optional status text, sanitizing both.
    pub fn set_status(&mut self, code: u16, text: Option<&str>) {
        let code = sanitize_status_code(code, 200);
        self.status = StatusCode::from_u16(code).ok();
        if let Some(text) = text {
            self.status_text = Some(sanitize_status_message(text));
        }
    }

    /// Whether anything was set since construction.
    pub fn has_overrides(&self) -> bool {
        self.status.is_some() || self.status_text.is_some() || !self.headers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{HeaderValue, SET_COOKIE};

    #[test]
    fn test_set_status_sanitizes() {
        let mut state = ResponseState::default();
        assert!(!state.has_overrides());

        state.set_status(201, Some("Created\r\n"));
        assert_eq!(state.status, Some(StatusCode::CREATED));
        assert_eq!(state.status_text.as_deref(), Some("Created"));
        assert!(state.has_overrides());

        state.set_status(5, None);
        assert_eq!(state.status, Some(StatusCode::OK));
    }

    #[test]
    fn test_header_semantics() {
        let mut state = ResponseState::default();
        state.headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        state.headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        assert_eq!(state.headers.get_all("Set-Cookie").iter().count(), 2);

        state.headers.insert(SET_COOKIE, HeaderValue::from_static("c=3"));
        assert_eq!(state.headers.get_all(SET_COOKIE).iter().count(), 1);

        state.headers.remove("SET-COOKIE");
        assert!(state.headers.is_empty());
    }
}
