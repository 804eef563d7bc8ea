//! Tool-name pattern matching.
//!
//! Policies carry glob-style patterns where `*` matches any substring.
//! Matching is anchored (the whole tool name must match) and
//! case-insensitive. Patterns are compiled once per policy load instead of
//! being interpreted on every evaluation.

use regex::{Regex, RegexBuilder};
use tracing::warn;

/// A policy's tool patterns, compiled for repeated matching.
#[derive(Debug, Clone)]
pub struct PatternSet {
    sources: Vec<String>,
    compiled: Vec<Regex>,
}

impl PatternSet {
    pub fn compile(patterns: &[String]) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|pattern| match compile_glob(pattern) {
                Some(re) => Some(re),
                None => {
                    warn!(pattern = %pattern, "skipping uncompilable tool pattern");
                    None
                }
            })
            .collect();
        Self {
            sources: patterns.to_vec(),
            compiled,
        }
    }

    /// True when any pattern in the set matches the full tool name.
    pub fn matches(&self, tool_name: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(tool_name))
    }

    /// The patterns this set was compiled from, used to detect staleness
    /// when a stored policy's patterns change between loads.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}

/// Translate one glob into an anchored case-insensitive regex.
/// Everything except `*` is literal; `*` becomes `.*`.
fn compile_glob(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for (i, segment) in pattern.split('*').enumerate() {
        if i > 0 {
            re.push_str(".*");
        }
        re.push_str(&regex::escape(segment));
    }
    re.push('$');

    // Same compiled-size cap the policy regex operators use elsewhere;
    // an escaped glob only trips it on absurd inputs.
    RegexBuilder::new(&re)
        .case_insensitive(true)
        .size_limit(1_000_000)
        .build()
        .ok()
}

// ── Tests ────────────────────────────────────────────────────
