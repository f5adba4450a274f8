//! LRU cache of compiled wildcard patterns
//!
//! Policies are evaluated on every request; compiling their patterns once
//! keeps evaluation to a handful of regex matches.

use super::pattern::{PatternMatcher, WildcardSyntax};
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;
use tracing::warn;

/// Default number of compiled patterns kept
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    pattern: String,
    syntax: WildcardSyntax,
}

/// Thread-safe LRU cache of compiled patterns
///
/// Patterns that fail to compile are cached as `None` and never match.
pub struct PatternCache {
    cache: Mutex<LruCache<CacheKey, Option<Regex>>>,
}

impl PatternCache {
    /// Create a cache holding up to `capacity` patterns (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        PatternCache {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Match `value` against `pattern`
    pub fn matches(&self, pattern: &str, syntax: WildcardSyntax, value: &str) -> bool {
        self.compiled(pattern, syntax)
            .map(|re| re.is_match(value))
            .unwrap_or(false)
    }

    /// True if any of `patterns` matches `value`
    pub fn matches_any(&self, patterns: &[String], value: &str) -> bool {
        patterns
            .iter()
            .any(|pattern| self.matches(pattern, WildcardSyntax::Star, value))
    }

    fn compiled(&self, pattern: &str, syntax: WildcardSyntax) -> Option<Regex> {
        let key = CacheKey {
            pattern: pattern.to_string(),
            syntax,
        };

        if let Some(cached) = self.cache.lock().get(&key) {
            return cached.clone();
        }

        // Compile outside the lock
        let compiled = match PatternMatcher::compile(pattern, syntax) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Pattern '{}' cannot be compiled and never matches: {}", pattern, e);
                None
            }
        };

        self.cache.lock().put(key, compiled.clone());
        compiled
    }

    /// Drop every compiled pattern
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for PatternCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternCache")
            .field("len", &self.len())
            .finish()
    }
}
