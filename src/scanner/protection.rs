//! Resource protection: config-level patterns that exempt resources from
//! removal regardless of their usage status.
//!
//! Pattern grammar, checked in this order per pattern:
//! - `tag:<name>` — protects resources carrying the tag `<name>`.
//! - `id:<value>` — protects the resource whose id equals `<value>` exactly.
//! - a pattern containing `*` — glob over the full resource name, where `*`
//!   matches any substring and every other character is literal.
//! - anything else — exact name match.
//!
//! A resource is protected if *any* configured pattern matches it.

#![allow(missing_docs)]

use regex::Regex;

use crate::core::errors::{DswError, Result};
use crate::core::resource::{Resource, ResourceKind};

/// How a single pattern decides whether it matches a resource.
#[derive(Debug, Clone)]
enum Matcher {
    Tag(String),
    Id(String),
    Glob(Regex),
    Name(String),
}

/// One configured pattern together with its original spelling, kept for
/// reason strings and listings.
#[derive(Debug, Clone)]
struct CompiledPattern {
    original: String,
    matcher: Matcher,
}

impl CompiledPattern {
    fn matches(&self, resource: &Resource) -> bool {
        match &self.matcher {
            Matcher::Tag(name) => resource.tags.contains(name),
            Matcher::Id(value) => resource.id == *value,
            Matcher::Glob(regex) => regex.is_match(&resource.name),
            Matcher::Name(name) => resource.name == *name,
        }
    }
}

/// Compiled protection patterns plus the filter that applies them.
#[derive(Debug, Clone, Default)]
pub struct ProtectionPolicy {
    patterns: Vec<CompiledPattern>,
}

impl ProtectionPolicy {
    /// Compile a pattern list from config. Fails on the first invalid
    /// pattern so a typo never silently unprotects anything.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|pattern| parse_pattern(pattern))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns: compiled })
    }

    /// Whether any configured pattern matches this resource.
    #[must_use]
    pub fn is_protected(&self, resource: &Resource) -> bool {
        self.patterns.iter().any(|p| p.matches(resource))
    }

    /// The first matching pattern's original spelling, or `None` if the
    /// resource is not protected.
    #[must_use]
    pub fn protection_reason(&self, resource: &Resource) -> Option<String> {
        self.patterns
            .iter()
            .find(|p| p.matches(resource))
            .map(|p| format!("protected by pattern: {}", p.original))
    }

    /// Drop protected resources, then restrict to `allowed_kinds` when the
    /// allow-list is non-empty. Pure function of its inputs.
    #[must_use]
    pub fn filter(&self, resources: Vec<Resource>, allowed_kinds: &[ResourceKind]) -> Vec<Resource> {
        resources
            .into_iter()
            .filter(|r| !self.is_protected(r))
            .filter(|r| allowed_kinds.is_empty() || allowed_kinds.contains(&r.kind()))
            .collect()
    }

    /// Number of configured patterns.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

/// Validate a single pattern without building a policy. Used by config
/// validation so a bad pattern is rejected at load time.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    parse_pattern(pattern).map(|_| ())
}

fn parse_pattern(pattern: &str) -> Result<CompiledPattern> {
    if pattern.trim().is_empty() {
        return Err(DswError::InvalidConfig {
            details: "protection pattern must not be empty".to_string(),
        });
    }

    let matcher = if let Some(name) = pattern.strip_prefix("tag:") {
        if name.is_empty() {
            return Err(DswError::InvalidConfig {
                details: format!("protection pattern {pattern:?} has an empty tag name"),
            });
        }
        Matcher::Tag(name.to_string())
    } else if let Some(value) = pattern.strip_prefix("id:") {
        if value.is_empty() {
            return Err(DswError::InvalidConfig {
                details: format!("protection pattern {pattern:?} has an empty id"),
            });
        }
        Matcher::Id(value.to_string())
    } else if pattern.contains('*') {
        Matcher::Glob(glob_to_regex(pattern)?)
    } else {
        Matcher::Name(pattern.to_string())
    };

    Ok(CompiledPattern {
        original: pattern.to_string(),
        matcher,
    })
}

/// Convert a name glob to a regex. Only `*` is special (matches any
/// substring); the result is anchored at both ends so the pattern must
/// cover the entire name.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex_str = String::with_capacity(pattern.len() * 2);
    regex_str.push('^');

    for c in pattern.chars() {
        match c {
            '*' => regex_str.push_str(".*"),
            '.' | '+' | '?' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '$' | '|' | '\\' => {
                regex_str.push('\\');
                regex_str.push(c);
            }
            c => regex_str.push(c),
        }
    }

    regex_str.push('$');

    Regex::new(&regex_str).map_err(|err| DswError::InvalidConfig {
        details: format!("invalid protection glob {pattern:?}: {err}"),
    })
}
