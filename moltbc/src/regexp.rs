//! Compiled regular expressions, cached per interpreter.
//!
//! `regexp`, `regsub`, `switch -regexp` and the compiled regexp instruction all look
//! their patterns up here, so a pattern used in a loop is compiled once.

use crate::molt_err;
use crate::types::*;
use indexmap::IndexMap;
use regex::Regex;
use regex::RegexBuilder;
use std::rc::Rc;

/// The number of patterns kept; the oldest is dropped to make room.
const CACHE_SIZE: usize = 30;

#[derive(Default)]
pub(crate) struct RegexCache {
    entries: IndexMap<(String, bool), Rc<Regex>, MoltHasher>,
}

impl RegexCache {
    /// Returns the compiled form of the pattern, compiling it if it isn't cached.
    pub(crate) fn get(&mut self, pattern: &str, nocase: bool) -> Result<Rc<Regex>, Exception> {
        let key = (pattern.to_string(), nocase);
        if let Some(re) = self.entries.get(&key) {
            return Ok(Rc::clone(re));
        }

        let re = match RegexBuilder::new(pattern).case_insensitive(nocase).build() {
            Ok(re) => Rc::new(re),
            Err(err) => return molt_err!("couldn't compile regular expression pattern: {}", err),
        };

        if self.entries.len() >= CACHE_SIZE {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(key, Rc::clone(&re));
        Ok(re)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse() {
        let mut cache = RegexCache::default();
        let a = cache.get("a+b", false).unwrap();
        let b = cache.get("a+b", false).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        // Case folding is part of the key.
        let c = cache.get("a+b", true).unwrap();
        assert!(!Rc::ptr_eq(&a, &c));
        assert!(c.is_match("AAB"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_bad_pattern() {
        let mut cache = RegexCache::default();
        assert!(cache.get("(", false).is_err());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_oldest_dropped() {
        let mut cache = RegexCache::default();
        let first = cache.get("p0", false).unwrap();
        for i in 1..=CACHE_SIZE {
            cache.get(&format!("p{}", i), false).unwrap();
        }
        assert_eq!(cache.len(), CACHE_SIZE);

        let again = cache.get("p0", false).unwrap();
        assert!(!Rc::ptr_eq(&first, &again));
    }
}
