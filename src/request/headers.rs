//! Response headers supplied by opaque requests
//!
//! Callers may set arbitrary headers in the record; anything that could
//! weaken security or confuse the transport is dropped.

use serde_json::{Map, Value};

const DENIED_HEADERS: [&str; 9] = [
    "authorization",
    "connection",
    "server",
    "transfer-encoding",
    "referrer-policy",
    "permissions-policy",
    "www-authenticate",
    "proxy-authenticate",
    "x-api-key",
];

const DENIED_PREFIXES: [&str; 10] = [
    "x-frame-",
    "x-content-",
    "x-xss-",
    "strict-transport-",
    "permissions-",
    "x-amz-",
    "x-amzn-",
    "access-control-",
    "cross-origin-",
    "content-",
];

pub fn is_denied(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    DENIED_HEADERS.contains(&name.as_str())
        || DENIED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Allowed headers in record order; non-string values are rendered as JSON
pub fn filter_headers(headers: &Map<String, Value>) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            let denied = is_denied(name);
            if denied {
                tracing::warn!(header = %name, "Dropping disallowed response header");
            }
            !denied
        })
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("Authorization", true)]
    #[case("X-Frame-Options", true)]
    #[case("content-type", true)]
    #[case("Access-Control-Allow-Origin", true)]
    #[case("x-amz-meta-owner", true)]
    #[case("Cache-Control", false)]
    #[case("X-Custom-Tag", false)]
    fn test_is_denied(#[case] name: &str, #[case] denied: bool) {
        assert_eq!(is_denied(name), denied);
    }

    #[test]
    fn test_filter_keeps_order() {
        let headers = json!({
            "Cache-Control": "max-age=60",
            "Server": "evil",
            "X-Count": 3,
            "Content-Security-Policy": "none"
        });
        let filtered = filter_headers(headers.as_object().unwrap());
        assert_eq!(
            filtered,
            vec![
                ("Cache-Control".to_string(), "max-age=60".to_string()),
                ("X-Count".to_string(), "3".to_string()),
            ]
        );
    }
}
