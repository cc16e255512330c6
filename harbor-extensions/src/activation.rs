//! Activation-event matching.
//!
//! Events and patterns have the form `type` or `type:value`. A pattern
//! matches when the types are equal and either the pattern carries no value,
//! or its value equals the event's value, or its value is a `*` wildcard
//! covering the whole event value. The bare pattern `*` matches every event.

use regex::Regex;
use tracing::warn;

pub const WILDCARD_EVENT: &str = "*";

pub fn matches_activation_event(pattern: &str, event: &str) -> bool {
    if pattern == WILDCARD_EVENT {
        return true;
    }

    let (pattern_type, pattern_value) = split(pattern);
    let (event_type, event_value) = split(event);
    if pattern_type != event_type {
        return false;
    }

    match (pattern_value, event_value) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(expected), Some(actual)) if expected.contains('*') => wildcard_matches(expected, actual),
        (Some(expected), Some(actual)) => expected == actual,
    }
}

fn split(s: &str) -> (&str, Option<&str>) {
    match s.split_once(':') {
        Some((kind, value)) => (kind, Some(value)),
        None => (s, None),
    }
}

fn wildcard_matches(pattern: &str, value: &str) -> bool {
    let body = pattern.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
    match Regex::new(&format!("^{body}$")) {
        Ok(re) => re.is_match(value),
        Err(e) => {
            warn!(pattern = %pattern, "Unusable activation pattern: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_everything() {
        assert!(matches_activation_event("*", "onStartup"));
        assert!(matches_activation_event("*", "onCommand:foo.bar"));
    }

    #[test]
    fn types_must_match() {
        assert!(!matches_activation_event("onCommand:foo.bar", "onView:foo.bar"));
        assert!(!matches_activation_event("onCommand", "onCommandX:foo"));
    }

    #[test]
    fn pattern_without_value_matches_any_value() {
        assert!(matches_activation_event("onCommand", "onCommand:foo.bar"));
        assert!(matches_activation_event("onStartup", "onStartup"));
    }

    #[test]
    fn exact_values() {
        assert!(matches_activation_event("onCommand:foo.bar", "onCommand:foo.bar"));
        assert!(!matches_activation_event("onCommand:foo.baz", "onCommand:foo.bar"));
        assert!(!matches_activation_event("onCommand:foo.bar", "onCommand"));
    }

    #[test]
    fn wildcard_values() {
        assert!(matches_activation_event("onCommand:foo.*", "onCommand:foo.bar"));
        assert!(matches_activation_event("onCommand:*", "onCommand:anything"));
        assert!(matches_activation_event("onFile:*.md", "onFile:notes/plan.md"));
        assert!(!matches_activation_event("onCommand:foo.*", "onCommand:bar.foo"));
        // Dots in the pattern are literal.
        assert!(!matches_activation_event("onCommand:foo.*", "onCommand:fooXbar"));
    }

    #[test]
    fn only_first_colon_splits() {
        assert!(matches_activation_event("onUri:https://*", "onUri:https://example.com"));
    }
}
