// src/pipeline/classify.rs

//! Partition the sources of one technology scope into isolated and
//! dependency-linked sets, and build the dependency edges.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{AppError, Result};
use crate::models::SourceConfig;
use crate::pipeline::extract::split_path;

/// Outcome of classifying one technology scope.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Classification {
    /// Sources with no dependency relationships, scheduled on their own interval
    pub isolated: Vec<String>,

    /// Sources connected by dependencies, executed together in topological order
    pub linked: Vec<String>,

    /// Directed edges, producer -> dependents
    pub edges: BTreeMap<String, Vec<String>>,
}

/// Classify the enabled sources of one technology.
///
/// A source is linked if it declares dependencies or is named in another
/// source's dependencies; everything else is isolated. Extract paths are
/// checked here: an empty path, or a path whose head is not one of the
/// source's declared dependencies, is a configuration defect surfaced as
/// [`AppError::MalformedExtractPath`].
pub fn classify(sources: &BTreeMap<String, SourceConfig>) -> Result<Classification> {
    let enabled: BTreeMap<&str, &SourceConfig> = sources
        .iter()
        .filter(|(_, s)| s.enabled)
        .map(|(name, s)| (name.as_str(), s))
        .collect();

    for (name, source) in &enabled {
        for path in source.extract_from.values() {
            let segments = split_path(path);
            match segments.first() {
                Some(head) if source.dependencies.iter().any(|d| d == head) => {}
                _ => return Err(AppError::malformed_path(*name, path.clone())),
            }
        }
    }

    let mut referenced: BTreeSet<&str> = BTreeSet::new();
    let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, source) in &enabled {
        for dep in &source.dependencies {
            if enabled.contains_key(dep.as_str()) {
                referenced.insert(dep.as_str());
                edges
                    .entry(dep.clone())
                    .or_default()
                    .push((*name).to_string());
            }
        }
    }

    let mut classification = Classification::default();
    for (name, source) in &enabled {
        if !source.dependencies.is_empty() || referenced.contains(name) {
            classification.linked.push((*name).to_string());
        } else {
            classification.isolated.push((*name).to_string());
        }
    }
    classification.edges = edges;
    Ok(classification)
}
