//! Fast-path splitting of an absolute request URL into path and query.
//!
//! The fast path only answers when slicing the raw string is guaranteed to give
//! the same bytes a full `url::Url` parse would. Anything the parser could
//! rewrite (dot segments, characters it percent-encodes, backslashes, fragments,
//! missing path) makes it return `None`, and callers fall back to the full parse.

/// Byte offsets into the raw URL: `path_start..query_start` is the pathname,
/// `query_start..` the query string including its leading `?` (empty when absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Split {
    pub path_start: usize,
    pub query_start: usize,
}

pub(crate) fn split_fast(raw: &str) -> Option<Split> {
    if raw.bytes().any(|b| b <= b' ' || b >= 0x7f || b == b'#' || b == b'\\') {
        return None;
    }

    let scheme_end = raw.find("://")?;
    let scheme = &raw[..scheme_end];
    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return None;
    }

    let authority_start = scheme_end + 3;
    let rest = &raw[authority_start..];
    let offset = rest.find(['/', '?'])?;
    if rest.as_bytes()[offset] != b'/' || offset == 0 {
        return None;
    }

    let path_start = authority_start + offset;
    let query_start = raw[path_start..]
        .find('?')
        .map(|i| path_start + i)
        .unwrap_or(raw.len());

    let path = &raw[path_start..query_start];
    let query = &raw[query_start..];
    if !path_is_stable(path) || !query_is_stable(query) {
        return None;
    }

    Some(Split {
        path_start,
        query_start,
    })
}

fn is_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-._~!$&()*+,;=:@".contains(&b)
}

fn has_valid_escapes(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3);
            match hex {
                Some(h) if h.iter().all(u8::is_ascii_hexdigit) => i += 3,
                _ => return false,
            }
        } else {
            i += 1;
        }
    }
    true
}

fn path_is_stable(path: &str) -> bool {
    if !path.bytes().all(|b| is_safe(b) || b == b'/' || b == b'%') || !has_valid_escapes(path) {
        return false;
    }
    !path.split('/').any(is_dot_segment)
}

fn is_dot_segment(segment: &str) -> bool {
    let lowered = segment.to_ascii_lowercase();
    matches!(
        lowered.as_str(),
        "." | ".." | "%2e" | ".%2e" | "%2e." | "%2e%2e"
    )
}

fn query_is_stable(query: &str) -> bool {
    query
        .bytes()
        .all(|b| is_safe(b) || b == b'/' || b == b'?' || b == b'%')
        && has_valid_escapes(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::{Position, Url};

    fn fast(raw: &str) -> Option<(&str, &str)> {
        split_fast(raw).map(|s| (&raw[s.path_start..s.query_start], &raw[s.query_start..]))
    }

    #[test]
    fn test_simple_split() {
        assert_eq!(
            fast("http://example.com/api/v1?x=1&y=2"),
            Some(("/api/v1", "?x=1&y=2"))
        );
        assert_eq!(fast("https://example.com/"), Some(("/", "")));
        assert_eq!(fast("http://example.com:8080/a?"), Some(("/a", "?")));
    }

    #[test]
    fn test_falls_back() {
        assert_eq!(fast("/relative?x=1"), None);
        assert_eq!(fast("http://example.com"), None);
        assert_eq!(fast("http://example.com?x=1"), None);
        assert_eq!(fast("http://example.com/a/../b"), None);
        assert_eq!(fast("http://example.com/a/%2E/b"), None);
        assert_eq!(fast("http://example.com/a b"), None);
        assert_eq!(fast("http://example.com/a#frag"), None);
        assert_eq!(fast("http://example.com/a\\b"), None);
        assert_eq!(fast("http://example.com/a?q='x'"), None);
        assert_eq!(fast("http://example.com/%zz"), None);
        assert_eq!(fast("ftp://example.com/file"), None);
        assert_eq!(fast("http://example.com/caf\u{e9}"), None);
    }

    #[test]
    fn test_fast_path_agrees_with_full_parse() {
        let samples = [
            "http://example.com/",
            "http://example.com/api/users/42",
            "http://example.com/api/users/42?expand=true&tags=a&tags=b",
            "https://user:pw@example.com:8443/a//b?",
            "http://EXAMPLE.com/Mixed/Case?Q=V",
            "http://example.com/encoded%20space?q=%2F",
            "http://example.com/a/b/?x=1?y=2",
            "http://example.com/items;v=1/@me?a=$b&c=(d)",
            "http://example.com/...",
            "http://example.com/.hidden/file.txt",
            "HTTP://example.com/upper-scheme?z",
            "http://127.0.0.1:3000/sse?token=abc~123",
        ];

        for raw in samples {
            let split = split_fast(raw).unwrap_or_else(|| panic!("fast path expected for {raw}"));
            let parsed = Url::parse(raw).unwrap();
            assert_eq!(
                &raw[split.path_start..split.query_start],
                parsed.path(),
                "pathname mismatch for {raw}"
            );
            assert_eq!(
                &raw[split.query_start..],
                &parsed[Position::AfterPath..Position::AfterQuery],
                "query mismatch for {raw}"
            );
        }
    }
}
