//! Custom path rewriting
//!
//! Operators map an arbitrary URL shape onto the legacy grammar with a
//! match pattern and a substitution. The pattern is either a ready-made
//! [`Regex`] or the delimited string form `/pattern/flags`.
//!
//! # Flags
//!
//! - `g`: replace every match (otherwise only the first)
//! - `i`, `m`, `s`: case-insensitive, multi-line, dot-matches-newline
//! - `u`, `y`, `d`: accepted and ignored
//!
//! Substitutions use `$1`/`$<name>` group references; `$&` inserts the
//! whole match.

use crate::error::ImageHandlerError;
use regex::Regex;
use std::borrow::Cow;

#[derive(Debug, Clone)]
pub struct CustomPathRewriter {
    pattern: Regex,
    global: bool,
    substitution: String,
}

impl CustomPathRewriter {
    /// Build from configuration values; both must be present
    pub fn from_config(
        match_pattern: Option<&str>,
        substitution: Option<&str>,
    ) -> Result<Self, ImageHandlerError> {
        let match_pattern = match_pattern.ok_or_else(|| {
            ImageHandlerError::configuration(
                "ThumborMapping::ParseCustomPath::RewriteMatchPatternUndefined",
                "The rewrite match pattern is not configured.",
            )
        })?;
        let substitution = substitution.ok_or_else(|| {
            ImageHandlerError::configuration(
                "ThumborMapping::ParseCustomPath::RewriteSubstitutionUndefined",
                "The rewrite substitution is not configured.",
            )
        })?;

        let (source, flags) = split_delimited(match_pattern);
        let mut prefix = String::new();
        let mut global = false;
        for flag in flags.chars() {
            match flag {
                'g' => global = true,
                'i' | 'm' | 's' => prefix.push(flag),
                _ => {}
            }
        }
        let source = if prefix.is_empty() {
            source.to_string()
        } else {
            format!("(?{}){}", prefix, source)
        };

        let pattern = Regex::new(&source).map_err(|e| {
            ImageHandlerError::configuration(
                "ThumborMapping::ParseCustomPath::InvalidRewriteMatchPattern",
                format!("The rewrite match pattern is not a valid expression: {}", e),
            )
        })?;

        Ok(Self::from_regex(pattern, global, substitution))
    }

    /// Build from an already compiled expression
    pub fn from_regex(pattern: Regex, global: bool, substitution: &str) -> Self {
        Self {
            pattern,
            global,
            substitution: translate_substitution(substitution),
        }
    }

    pub fn rewrite<'p>(&self, path: &'p str) -> Cow<'p, str> {
        let rewritten = if self.global {
            self.pattern.replace_all(path, self.substitution.as_str())
        } else {
            self.pattern.replace(path, self.substitution.as_str())
        };
        tracing::debug!(path = %path, rewritten = %rewritten, "Rewrote custom path");
        rewritten
    }
}

/// `/pattern/flags` → (`pattern`, `flags`); anything else is a bare pattern
fn split_delimited(value: &str) -> (&str, &str) {
    if let Some(rest) = value.strip_prefix('/') {
        if let Some(end) = rest.rfind('/') {
            return (&rest[..end], &rest[end + 1..]);
        }
    }
    (value, "")
}

/// Map `$&` onto the regex crate's whole-match group and brace bare
/// group numbers so `$1a` stays group 1 followed by `a`
fn translate_substitution(substitution: &str) -> String {
    let mut out = String::with_capacity(substitution.len());
    let mut chars = substitution.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('<') => {
                chars.next();
                let name: String = chars.by_ref().take_while(|c| *c != '>').collect();
                out.push_str(&format!("${{{}}}", name));
            }
            Some(d) if d.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                    if digits.len() == 2 {
                        break;
                    }
                }
                out.push_str(&format!("${{{}}}", digits));
            }
            _ => out.push_str("$$"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimited_global_pattern() {
        let rewriter = CustomPathRewriter::from_config(Some("/(filters-)/gm"), Some("filters:")).unwrap();
        assert_eq!(
            rewriter.rewrite("/filters-rotate(90)/filters-grayscale()/x.jpg"),
            "/filters:rotate(90)/filters:grayscale()/x.jpg"
        );
    }

    #[test]
    fn test_ready_regex_matches_delimited_form() {
        let delimited = CustomPathRewriter::from_config(Some("/(filters-)/gm"), Some("filters:")).unwrap();
        let compiled =
            CustomPathRewriter::from_regex(Regex::new("(?m)(filters-)").unwrap(), true, "filters:");
        let path = "/filters-rotate(90)/filters-grayscale()/x.jpg";
        assert_eq!(delimited.rewrite(path), compiled.rewrite(path));
    }

    #[test]
    fn test_without_global_flag_replaces_first() {
        let rewriter = CustomPathRewriter::from_config(Some("/a/"), Some("b")).unwrap();
        assert_eq!(rewriter.rewrite("/aaa"), "/baa");
    }

    #[test]
    fn test_case_insensitive_and_groups() {
        let rewriter = CustomPathRewriter::from_config(
            Some(r"/^/IMG/(\d+)x(\d+)/(.*)$/i"),
            Some("/fit-in/$1x$2/$3"),
        )
        .unwrap();
        assert_eq!(rewriter.rewrite("/img/300x200/cat.jpg"), "/fit-in/300x200/cat.jpg");
    }

    #[test]
    fn test_whole_match_reference() {
        let rewriter = CustomPathRewriter::from_config(Some("/cat/g"), Some("[$&]")).unwrap();
        assert_eq!(rewriter.rewrite("/cat.jpg"), "/[cat].jpg");
    }

    #[test]
    fn test_missing_settings_are_configuration_errors() {
        let err = CustomPathRewriter::from_config(None, Some("x")).unwrap_err();
        assert_eq!(
            err.code(),
            "ThumborMapping::ParseCustomPath::RewriteMatchPatternUndefined"
        );
        let err = CustomPathRewriter::from_config(Some("/x/"), None).unwrap_err();
        assert_eq!(err.to_http_status(), 500);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = CustomPathRewriter::from_config(Some("/(unclosed/g"), Some("x")).unwrap_err();
        assert_eq!(
            err.code(),
            "ThumborMapping::ParseCustomPath::InvalidRewriteMatchPattern"
        );
    }
}
