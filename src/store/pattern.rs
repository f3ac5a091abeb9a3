//! Glob matching for bulk key eviction.
//!
//! Supported wildcards: `*` matches any run of characters (including an
//! empty one), `?` matches exactly one character. Everything else matches
//! itself, case-sensitively.

/// Match `key` against `pattern`.
///
/// Iterative two-pointer matcher with star backtracking, so pathological
/// patterns stay linear-ish instead of exploding recursively.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = key.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    // Position of the last `*` seen and the text position it matched up to.
    let mut star: Option<usize> = None;
    let mut star_t = 0usize;

    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star {
            // Grow the last star's match by one character and retry.
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    // Only trailing stars may remain.
    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match_is_exact() {
        assert!(glob_match("user:1", "user:1"));
        assert!(!glob_match("user:1", "user:12"));
        assert!(!glob_match("user:1", "User:1"));
    }

    #[test]
    fn test_star_matches_any_run() {
        assert!(glob_match("user:*", "user:1"));
        assert!(glob_match("user:*", "user:"));
        assert!(glob_match("user:*", "user:1:profile"));
        assert!(!glob_match("user:*", "order:1"));
    }

    #[test]
    fn test_question_mark_matches_one_char() {
        assert!(glob_match("user:?", "user:1"));
        assert!(!glob_match("user:?", "user:"));
        assert!(!glob_match("user:?", "user:12"));
    }

    #[test]
    fn test_inner_and_multiple_stars() {
        assert!(glob_match("*:1", "user:1"));
        assert!(glob_match("u*r:*", "user:42"));
        assert!(glob_match("**", "anything"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn test_star_backtracking() {
        assert!(glob_match("a*b*c", "axxbxxbc"));
        assert!(!glob_match("a*b*c", "axxbxxb"));
    }
}
