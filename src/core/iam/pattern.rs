//! Wildcard pattern matching for IAM subjects, resources and permissions
//!
//! Patterns are compiled to anchored, case-sensitive regular expressions.
//! Every regex metacharacter in the pattern is escaped first, so only the
//! wildcards below carry meaning:
//! - `*` - any run of characters, including `/` and newlines
//! - `?` - exactly one character ([`WildcardSyntax::Shell`] only)
//!
//! Examples:
//! - `mfs:/data/*` matches `mfs:/data/a/b.txt`
//! - `mfs::Get*` matches `mfs::GetObject` and `mfs::GetPublicObject`
//! - `mfs:/a.txt` does not match `mfs:/abtxt`

use regex::Regex;

/// Which wildcards a pattern honours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WildcardSyntax {
    /// `*` only. Policy usernames, resources and permissions.
    Star,
    /// `*` and `?`. `StringLike` conditions.
    Shell,
}

/// Pattern compiler
pub struct PatternMatcher;

impl PatternMatcher {
    /// Translate a wildcard pattern into its regular expression source
    pub fn to_regex_source(pattern: &str, syntax: WildcardSyntax) -> String {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push_str("^(?s:");
        let mut buf = [0u8; 4];
        for c in pattern.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' if syntax == WildcardSyntax::Shell => source.push('.'),
                _ => source.push_str(&regex::escape(c.encode_utf8(&mut buf))),
            }
        }
        source.push_str(")$");
        source
    }

    /// Compile a wildcard pattern
    ///
    /// Fails only when the pattern exceeds the regex size limits.
    pub fn compile(pattern: &str, syntax: WildcardSyntax) -> Result<Regex, regex::Error> {
        Regex::new(&Self::to_regex_source(pattern, syntax))
    }

    /// Uncached one-off match with `*` semantics
    pub fn matches(pattern: &str, value: &str) -> bool {
        Self::compile(pattern, WildcardSyntax::Star)
            .map(|re| re.is_match(value))
            .unwrap_or(false)
    }
}
