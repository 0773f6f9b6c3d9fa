//! Shell-style glob matching for rule patterns.
//!
//! Supports `*` (any run of characters, including `/` and newlines) and
//! `?` (any single character), matching the whole string. Everything else
//! is literal. Matching is case-sensitive here; callers lowercase both
//! sides first.

use regex::Regex;

/// Match `text` against a `*`/`?` glob pattern.
pub fn glob_match(text: &str, pattern: &str) -> bool {
    match Regex::new(&glob_to_regex(pattern)) {
        Ok(re) => re.is_match(text),
        Err(e) => {
            // Unreachable for escaped input; guard against it anyway.
            tracing::warn!(pattern = %pattern, error = %e, "Unmatchable glob pattern");
            false
        }
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => {
                let mut buf = [0u8; 4];
                re.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }
    re.push('$');
    re
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        assert!(glob_match("read:file", "read:*"));
        assert!(glob_match("read:", "read:*"));
        assert!(glob_match("anything at all", "*"));
        assert!(!glob_match("write:file", "read:*"));
    }

    #[test]
    fn star_crosses_path_separators() {
        assert!(glob_match("s3://bucket/a/b/c", "s3://bucket/*"));
        assert!(glob_match("payments/Q4/raw", "payments/*"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(glob_match("read:a", "read:?"));
        assert!(!glob_match("read:ab", "read:?"));
        assert!(!glob_match("read:", "read:?"));
    }

    #[test]
    fn literal_metacharacters_are_escaped() {
        assert!(glob_match("a.b", "a.b"));
        assert!(!glob_match("axb", "a.b"));
        assert!(glob_match("read (v2)", "read (v2)"));
        assert!(glob_match("a+b", "a+b"));
    }

    #[test]
    fn whole_string_match_only() {
        assert!(!glob_match("reread:file", "read:*"));
        assert!(!glob_match("read:file!", "read:file"));
    }

    #[test]
    fn empty_pattern_matches_only_empty() {
        assert!(glob_match("", ""));
        assert!(!glob_match("x", ""));
    }
}
