//! Topic subscriptions and wildcard matching
//!
//! A pattern is either a literal topic, matched by string equality, or a
//! glob containing `*`, compiled once into an anchored regex where every
//! `*` becomes `.*` and all other characters match literally.

use regex::Regex;

#[derive(Debug, Clone)]
enum Matcher {
    Literal,
    Glob(Regex),
}

/// One subscription pattern with its loss-tolerance flag
#[derive(Debug, Clone)]
pub struct Subscription {
    pattern: String,
    lossless: bool,
    matcher: Matcher,
}

impl Subscription {
    /// Compile a pattern; globs become anchored regexes
    pub fn new(pattern: &str, lossless: bool) -> Result<Self, regex::Error> {
        let matcher = if pattern.contains('*') {
            let regex_pattern: String = pattern
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            Matcher::Glob(Regex::new(&format!("^{regex_pattern}$"))?)
        } else {
            Matcher::Literal
        };

        Ok(Self {
            pattern: pattern.to_owned(),
            lossless,
            matcher,
        })
    }

    /// The pattern as the client sent it
    #[inline]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True when drops for this subscription should be counted as
    /// backpressure (alerting) rather than routine queue overflow
    #[inline]
    pub fn lossless(&self) -> bool {
        self.lossless
    }

    /// Check a concrete topic against this pattern
    #[inline]
    pub fn matches(&self, topic: &str) -> bool {
        match &self.matcher {
            Matcher::Literal => self.pattern == topic,
            Matcher::Glob(regex) => regex.is_match(topic),
        }
    }
}

#[cfg(test)]
#[path = "subscription_test.rs"]
mod tests;
