//! Glob pattern matching for `KEYS`.
//!
//! Supports `*`, `?`, character classes (`[abc]`, `[a-z]`, `[^x]`) and `\`
//! escapes. Matching is done on chars, so multi-byte keys behave.

/// A compiled `KEYS` pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: Vec<char>,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.chars().collect(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        matches_from(&self.pattern, &text)
    }
}

fn matches_from(pattern: &[char], text: &[char]) -> bool {
    let Some(&first) = pattern.first() else {
        return text.is_empty();
    };

    match first {
        '*' => {
            // Collapse runs of '*'
            let rest = &pattern[1..];
            if rest.first() == Some(&'*') {
                return matches_from(rest, text);
            }
            (0..=text.len()).any(|i| matches_from(rest, &text[i..]))
        }
        '?' => !text.is_empty() && matches_from(&pattern[1..], &text[1..]),
        '[' => {
            let Some(&c) = text.first() else {
                return false;
            };

            let mut i = 1;
            let negate = pattern.get(1) == Some(&'^');
            if negate {
                i += 1;
            }

            let mut matched = false;
            while i < pattern.len() && pattern[i] != ']' {
                if pattern[i] == '\\' && i + 1 < pattern.len() {
                    i += 1;
                    matched |= pattern[i] == c;
                } else if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
                    let (lo, hi) = (pattern[i], pattern[i + 2]);
                    matched |= lo.min(hi) <= c && c <= lo.max(hi);
                    i += 2;
                } else {
                    matched |= pattern[i] == c;
                }
                i += 1;
            }

            // Unterminated class never matches
            if i >= pattern.len() {
                return false;
            }
            matched != negate && matches_from(&pattern[i + 1..], &text[1..])
        }
        '\\' if pattern.len() > 1 => {
            text.first() == Some(&pattern[1]) && matches_from(&pattern[2..], &text[1..])
        }
        literal => text.first() == Some(&literal) && matches_from(&pattern[1..], &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_star() {
        let pattern = GlobPattern::new("user:*");
        assert!(pattern.matches("user:1"));
        assert!(pattern.matches("user:"));
        assert!(!pattern.matches("users"));

        assert!(GlobPattern::new("*").matches(""));
        assert!(GlobPattern::new("a**b").matches("axxb"));
    }

    #[test]
    fn test_glob_question() {
        let pattern = GlobPattern::new("h?llo");
        assert!(pattern.matches("hello"));
        assert!(pattern.matches("hallo"));
        assert!(!pattern.matches("hllo"));
    }

    #[test]
    fn test_glob_class() {
        let pattern = GlobPattern::new("h[ae]llo");
        assert!(pattern.matches("hello"));
        assert!(pattern.matches("hallo"));
        assert!(!pattern.matches("hillo"));

        let range = GlobPattern::new("key[0-9]");
        assert!(range.matches("key7"));
        assert!(!range.matches("keyx"));

        let negated = GlobPattern::new("h[^e]llo");
        assert!(negated.matches("hallo"));
        assert!(!negated.matches("hello"));
    }

    #[test]
    fn test_glob_escape() {
        let pattern = GlobPattern::new(r"a\*b");
        assert!(pattern.matches("a*b"));
        assert!(!pattern.matches("axb"));
    }

    #[test]
    fn test_glob_unicode() {
        assert!(GlobPattern::new("caf?").matches("café"));
    }
}
