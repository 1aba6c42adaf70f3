//! Shell-style glob patterns used to select joints by name

use std::fmt;

/// A glob pattern: `*` matches any run of characters, `?` any single
/// character, `[abc]`, `[a-z]` and `[!a-z]` character classes, and `\`
/// escapes the next character.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GlobPattern {
    pattern: String,
    case_sensitive: bool,
}

impl GlobPattern {
    /// Create a case-sensitive pattern
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: true,
        }
    }

    /// Set case sensitivity
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// The source text
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True if the pattern contains no wildcard characters
    pub fn has_glob_characters(&self) -> bool {
        let mut chars = self.pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' | '?' | '[' => return true,
                '\\' => {
                    chars.next();
                }
                _ => {}
            }
        }
        false
    }

    /// Test a candidate string
    pub fn matches(&self, candidate: &str) -> bool {
        let pattern: Vec<char> = self.fold(&self.pattern);
        let candidate: Vec<char> = self.fold(candidate);
        matches_from(&pattern, &candidate)
    }

    fn fold(&self, text: &str) -> Vec<char> {
        if self.case_sensitive {
            text.chars().collect()
        } else {
            text.chars().flat_map(char::to_lowercase).collect()
        }
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobPattern({:?})", self.pattern)
    }
}

impl From<&str> for GlobPattern {
    fn from(pattern: &str) -> Self {
        Self::new(pattern)
    }
}

/// Iterative match with one saved star position. Every token other than
/// `*` consumes exactly one character, so retrying from the last star is
/// enough and the cost stays O(pattern * candidate).
fn matches_from(pattern: &[char], candidate: &[char]) -> bool {
    let (mut p, mut c) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while c < candidate.len() {
        if pattern.get(p) == Some(&'*') {
            p += 1;
            star = Some((p, c));
            continue;
        }
        if let Some(next) = match_token(pattern, p, candidate[c]) {
            p = next;
            c += 1;
            continue;
        }
        match star {
            // Let the last star swallow one more character
            Some((star_p, star_c)) => {
                p = star_p;
                c = star_c + 1;
                star = Some((star_p, c));
            }
            None => return false,
        }
    }
    pattern[p..].iter().all(|&t| t == '*')
}

/// Match the token at `pattern[p]` against one character. Returns the
/// position of the following token.
fn match_token(pattern: &[char], p: usize, c: char) -> Option<usize> {
    match *pattern.get(p)? {
        '?' => Some(p + 1),
        '[' => match match_class(&pattern[p + 1..], c) {
            Some((true, after)) => Some(pattern.len() - after.len()),
            Some((false, _)) => None,
            // Unterminated class: treat '[' literally.
            None => (c == '[').then_some(p + 1),
        },
        '\\' => match pattern.get(p + 1) {
            Some(&escaped) => (c == escaped).then_some(p + 2),
            None => (c == '\\').then_some(p + 1),
        },
        literal => (c == literal).then_some(p + 1),
    }
}

/// Match `c` against the class body following '['. Returns whether it
/// matched and the pattern after the closing ']', or None if unterminated.
fn match_class(body: &[char], c: char) -> Option<(bool, &[char])> {
    let (negate, mut i) = match body.first() {
        Some('!') | Some('^') => (true, 1),
        _ => (false, 0),
    };
    let mut matched = false;
    let mut first = true;

    while i < body.len() {
        let lo = body[i];
        if lo == ']' && !first {
            return Some((matched != negate, &body[i + 1..]));
        }
        first = false;

        if i + 2 < body.len() && body[i + 1] == '-' && body[i + 2] != ']' {
            let hi = body[i + 2];
            if lo <= c && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if lo == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        let glob = GlobPattern::new("head");
        assert!(glob.matches("head"));
        assert!(!glob.matches("heads"));
        assert!(!glob.has_glob_characters());
    }

    #[test]
    fn test_star_and_question() {
        let glob = GlobPattern::new("l_*_??");
        assert!(glob.matches("l_arm_01"));
        assert!(glob.matches("l__ab"));
        assert!(!glob.matches("r_arm_01"));
        assert!(!glob.matches("l_arm_1"));
        assert!(GlobPattern::new("*").matches(""));
        assert!(GlobPattern::new("**").matches("anything"));
        assert!(GlobPattern::new("*_end").matches("a_end_end"));
        assert!(!GlobPattern::new("a*").matches(""));
    }

    #[test]
    fn test_many_stars_on_long_name() {
        let name = "a".repeat(200);
        assert!(!GlobPattern::new("*a*a*a*a*a*a*a*a*b").matches(&name));
        assert!(GlobPattern::new("*a*a*a*a*a*a*a*a*a").matches(&name));
        assert!(GlobPattern::new("*a?[a-c]*").matches(&name));
    }

    #[test]
    fn test_classes() {
        let glob = GlobPattern::new("finger[0-3]");
        assert!(glob.matches("finger2"));
        assert!(!glob.matches("finger4"));

        let negated = GlobPattern::new("finger[!0-3]");
        assert!(negated.matches("finger4"));
        assert!(!negated.matches("finger0"));

        let bracket = GlobPattern::new("a[]]b");
        assert!(bracket.matches("a]b"));
    }

    #[test]
    fn test_escape_and_unterminated() {
        assert!(GlobPattern::new(r"a\*b").matches("a*b"));
        assert!(!GlobPattern::new(r"a\*b").matches("axb"));
        assert!(GlobPattern::new("a[b").matches("a[b"));
    }

    #[test]
    fn test_case_insensitive() {
        let glob = GlobPattern::new("Spine*").with_case_sensitive(false);
        assert!(glob.matches("spine_02"));
        assert!(!GlobPattern::new("Spine*").matches("spine_02"));
    }
}
