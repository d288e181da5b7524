// src/utils/mod.rs

//! Utility functions and helpers.

pub mod time;

use std::collections::BTreeSet;

use regex::Regex;

/// Collect the `{param}` placeholder tokens of an endpoint template.
pub fn placeholders(template: &str) -> BTreeSet<String> {
    let pattern = Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder regex is valid");
    pattern
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Substitute one `{param}` token with a literal value.
///
/// Substitution is literal; values are not URL-encoded.
pub fn substitute(template: &str, param: &str, value: &str) -> String {
    template.replace(&format!("{{{param}}}"), value)
}

/// Join a technology base URL and a source endpoint.
pub fn join_url(base: &str, endpoint: &str) -> String {
    if endpoint.is_empty() {
        return base.trim_end_matches('/').to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
