// src/pipeline/group.rs

//! Chained execution of one dependency-linked source group.
//!
//! The group runs once per scheduling pass, in topological order, against a
//! pass-scoped [`ResultStore`]. Chained sources substitute values extracted
//! from their dependencies' stored results into their endpoint template,
//! fanning out into one request per extracted value.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{HttpMethod, SourceConfig};
use crate::pipeline::extract::{extract, scalar_to_string, split_path};
use crate::pipeline::process::{SourceContext, emit_merged};
use crate::services::paginate;
use crate::utils::substitute;

/// Stored outcome of one source execution within a group pass.
#[derive(Debug, Clone)]
pub enum StoredResult {
    /// A plain decoded response (source had no substitutions).
    Single(Value),

    /// One entry per executed endpoint variant.
    FannedOut(Vec<FanOutEntry>),
}

/// One executed endpoint variant of a fanned-out source.
#[derive(Debug, Clone)]
pub struct FanOutEntry {
    /// The last substituted value, e.g. "1" for `/x/1`
    pub extracted: String,

    /// All parameter bindings that produced this variant
    pub bindings: BTreeMap<String, String>,

    /// Decoded response of the variant request
    pub response: Value,
}

/// Pass-scoped results, keyed by source name. Cleared for every pass; never
/// shared across technology scopes.
pub type ResultStore = BTreeMap<String, StoredResult>;

/// An endpoint variant under construction.
#[derive(Debug, Clone)]
struct Variant {
    endpoint: String,
    bindings: BTreeMap<String, String>,
    last_value: String,
}

impl Variant {
    fn template(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            bindings: BTreeMap::new(),
            last_value: String::new(),
        }
    }

    fn bind(&self, param: &str, value: &str) -> Self {
        let mut bindings = self.bindings.clone();
        bindings.insert(param.to_string(), value.to_string());
        Self {
            endpoint: substitute(&self.endpoint, param, value),
            bindings,
            last_value: value.to_string(),
        }
    }
}

/// Execute one ordered group pass.
///
/// Fail-fast: a missing dependency result or a fetch that exhausts its
/// retries aborts the remaining group; records already emitted stand, the
/// pass-scoped store is discarded.
pub async fn run_linked_group(
    ctx: &SourceContext<'_>,
    order: &[String],
    sources: &BTreeMap<String, SourceConfig>,
    queries: &BTreeMap<String, Vec<(String, String)>>,
) -> Result<ResultStore> {
    let mut store = ResultStore::new();

    for name in order {
        let Some(source) = sources.get(name) else {
            continue;
        };
        let query = queries.get(name).cloned().unwrap_or_default();

        if source.extract_from.is_empty() {
            run_plain(ctx, name, source, &query, &mut store).await?;
        } else {
            run_chained(ctx, name, source, &query, &mut store).await?;
        }
    }

    Ok(store)
}

/// Fetch a source without substitutions and store the plain response.
///
/// Covers group roots and ordering-only dependents (dependencies declared,
/// nothing extracted).
async fn run_plain(
    ctx: &SourceContext<'_>,
    name: &str,
    source: &SourceConfig,
    query: &[(String, String)],
    store: &mut ResultStore,
) -> Result<()> {
    let method = HttpMethod::parse(&source.method)?;
    let url = ctx.url(&source.endpoint);
    let headers = ctx.headers(source);

    let response = match &ctx.tech.pagination {
        Some(pagination) => {
            paginate(ctx.fetcher, &url, method, &headers, query, pagination).await?
        }
        None => ctx
            .fetcher
            .fetch(&url, method, query, &headers, source.body.as_ref())
            .await?
            .map(|p| p.into_value()),
    };

    match response {
        Some(value) => {
            emit_merged(ctx, name, &value).await?;
            store.insert(name.to_string(), StoredResult::Single(value));
        }
        None => {
            log::warn!("No data returned for {}", ctx.qualified(name));
        }
    }
    Ok(())
}

/// Build the endpoint variants for a chained source and fetch each one.
async fn run_chained(
    ctx: &SourceContext<'_>,
    name: &str,
    source: &SourceConfig,
    query: &[(String, String)],
    store: &mut ResultStore,
) -> Result<()> {
    for dependency in &source.dependencies {
        if !store.contains_key(dependency) {
            return Err(AppError::missing_dependency(name, dependency));
        }
    }

    let variants = build_variants(name, source, store)?;
    if variants.is_empty() {
        log::warn!(
            "No substitution values extracted for {}; nothing to fetch",
            ctx.qualified(name)
        );
        store.insert(name.to_string(), StoredResult::FannedOut(Vec::new()));
        return Ok(());
    }

    let method = HttpMethod::parse(&source.method)?;
    let headers = ctx.headers(source);
    let qualified = ctx.qualified(name);

    let mut entries = Vec::with_capacity(variants.len());
    for variant in variants {
        let url = ctx.url(&variant.endpoint);
        let payload = ctx
            .fetcher
            .fetch(&url, method, query, &headers, source.body.as_ref())
            .await?;

        match payload {
            Some(payload) => {
                let response = payload.into_value();
                ctx.sink.emit(&qualified, &response).await?;
                entries.push(FanOutEntry {
                    extracted: variant.last_value,
                    bindings: variant.bindings,
                    response,
                });
            }
            None => {
                log::warn!("No data returned for variant {url} of {qualified}");
            }
        }
    }

    store.insert(name.to_string(), StoredResult::FannedOut(entries));
    Ok(())
}

/// Apply every `extract_from` entry of a source to its endpoint template,
/// producing the final variant set.
///
/// Substitutions are applied in placeholder-name order. The first
/// substitution fans the template out; later substitutions refine the
/// existing set, narrowing against fanned-out dependencies instead of
/// cross-multiplying (see [`narrow`]).
fn build_variants(
    name: &str,
    source: &SourceConfig,
    store: &ResultStore,
) -> Result<Vec<Variant>> {
    let mut variants = vec![Variant::template(&source.endpoint)];

    for (param, path) in &source.extract_from {
        let segments = split_path(path);
        let (head, keys) = segments
            .split_first()
            .ok_or_else(|| AppError::malformed_path(name, path.clone()))?;
        let entry = store
            .get(*head)
            .ok_or_else(|| AppError::missing_dependency(name, *head))?;

        variants = apply_substitution(&variants, param, entry, keys);
    }
    Ok(variants)
}

/// Substitute one parameter across the current variant set.
fn apply_substitution(
    variants: &[Variant],
    param: &str,
    entry: &StoredResult,
    keys: &[&str],
) -> Vec<Variant> {
    let mut out = Vec::new();

    match entry {
        StoredResult::Single(response) => {
            let values = leaf_strings(response, keys, param);
            for variant in variants {
                for value in &values {
                    out.push(variant.bind(param, value));
                }
            }
        }
        StoredResult::FannedOut(entries) => {
            for variant in variants {
                for pair in narrow(entries, variant) {
                    for value in leaf_strings(&pair.response, keys, param) {
                        out.push(variant.bind(param, &value));
                    }
                }
            }
        }
    }
    out
}

/// Select which fan-out entries of a dependency apply to one variant.
///
/// When the dependency's entries share a parameter name with the variant's
/// existing bindings, only entries agreeing on every shared parameter
/// qualify; this keeps a second-level substitution tied to the variant that
/// the same upstream value produced. Without shared parameters, an entry
/// whose extracted value already appears among the variant's bindings is
/// preferred. Failing both, every entry applies (plain cross-product).
fn narrow<'a>(entries: &'a [FanOutEntry], variant: &Variant) -> Vec<&'a FanOutEntry> {
    let any_shared = entries.iter().any(|entry| {
        entry
            .bindings
            .keys()
            .any(|key| variant.bindings.contains_key(key))
    });
    if any_shared {
        return entries
            .iter()
            .filter(|entry| {
                let mut shared = entry
                    .bindings
                    .iter()
                    .filter_map(|(key, value)| variant.bindings.get(key).map(|v| (value, v)))
                    .peekable();
                shared.peek().is_some() && shared.all(|(a, b)| a == b)
            })
            .collect();
    }

    let by_value: Vec<&FanOutEntry> = entries
        .iter()
        .filter(|entry| variant.bindings.values().any(|v| *v == entry.extracted))
        .collect();
    if !by_value.is_empty() {
        return by_value;
    }

    entries.iter().collect()
}

/// Extract leaves and keep the scalar ones, warning about the rest.
fn leaf_strings(response: &Value, keys: &[&str], param: &str) -> Vec<String> {
    extract(response, keys)
        .iter()
        .filter_map(|leaf| {
            let value = scalar_to_string(leaf);
            if value.is_none() {
                log::warn!("Skipping non-scalar extracted value for parameter '{param}'");
            }
            value
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::models::{PaginationConfig, TechnologyConfig};
    use crate::services::fetcher::tests::{FakeTransport, json_response};
    use crate::services::{ApiTransport, Fetcher, RawResponse};
    use crate::sink::MemorySink;

    fn tech(pagination: Option<PaginationConfig>) -> TechnologyConfig {
        TechnologyConfig {
            enabled: true,
            base_url: "https://api.test".into(),
            api_token: None,
            token_expires: None,
            authentication: String::new(),
            pagination,
            sources: BTreeMap::new(),
        }
    }

    fn source(
        endpoint: &str,
        deps: &[&str],
        extract: &[(&str, &str)],
    ) -> SourceConfig {
        SourceConfig {
            enabled: true,
            interval: None,
            endpoint: endpoint.into(),
            method: "GET".into(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            body: None,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            extract_from: extract
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn scripted(script: Vec<&str>) -> (Fetcher, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::new(
            script
                .into_iter()
                .map(|s| Ok(json_response(s)))
                .collect::<Vec<crate::error::Result<RawResponse>>>(),
        ));
        (
            Fetcher::new(Arc::clone(&transport) as Arc<dyn ApiTransport>),
            transport,
        )
    }

    async fn run(
        tech: &TechnologyConfig,
        fetcher: &Fetcher,
        sink: &MemorySink,
        order: &[&str],
        entries: Vec<(&str, SourceConfig)>,
    ) -> Result<ResultStore> {
        let ctx = SourceContext {
            entity: "acme",
            technology: "cloudapp",
            tech,
            fetcher,
            sink,
        };
        let order: Vec<String> = order.iter().map(|s| s.to_string()).collect();
        let sources: BTreeMap<String, SourceConfig> = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        run_linked_group(&ctx, &order, &sources, &BTreeMap::new()).await
    }

    #[tokio::test]
    async fn test_fan_out_one_fetch_per_extracted_value() {
        let tech = tech(None);
        let (fetcher, transport) = scripted(vec![
            r#"{"items": [{"id": 1}, {"id": 2}]}"#,
            r#"{"detail": "one"}"#,
            r#"{"detail": "two"}"#,
        ]);
        let sink = MemorySink::new();

        let store = run(
            &tech,
            &fetcher,
            &sink,
            &["a", "b"],
            vec![
                ("a", source("/list", &[], &[])),
                ("b", source("/x/{id}", &["a"], &[("id", "a.items.id")])),
            ],
        )
        .await
        .unwrap();

        assert_eq!(
            *transport.calls.lock().unwrap(),
            vec![
                "https://api.test/list",
                "https://api.test/x/1",
                "https://api.test/x/2",
            ]
        );

        let StoredResult::FannedOut(entries) = &store["b"] else {
            panic!("expected fan-out result for b");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].extracted, "1");
        assert_eq!(entries[1].extracted, "2");
        assert_eq!(entries[0].response, json!({"detail": "one"}));

        assert_eq!(sink.records_for("acme.cloudapp.b").len(), 2);
    }

    #[tokio::test]
    async fn test_second_substitution_narrows_instead_of_cross_product() {
        let tech = tech(None);
        // a -> list of ids; b fans out over a; c joins a and b.
        let (fetcher, transport) = scripted(vec![
            r#"{"items": [{"id": 1}, {"id": 2}]}"#,
            r#"{"name": "one"}"#,
            r#"{"name": "two"}"#,
            r#"{"ok": 1}"#,
            r#"{"ok": 2}"#,
        ]);
        let sink = MemorySink::new();

        let store = run(
            &tech,
            &fetcher,
            &sink,
            &["a", "b", "c"],
            vec![
                ("a", source("/list", &[], &[])),
                ("b", source("/x/{id}", &["a"], &[("id", "a.items.id")])),
                (
                    "c",
                    source(
                        "/y/{id}/{name}",
                        &["a", "b"],
                        &[("id", "a.items.id"), ("name", "b.name")],
                    ),
                ),
            ],
        )
        .await
        .unwrap();

        // Narrowing: c gets /y/1/one and /y/2/two, never the disconnected
        // cross-product /y/1/two or /y/2/one.
        let calls = transport.calls.lock().unwrap();
        assert!(calls.contains(&"https://api.test/y/1/one".to_string()));
        assert!(calls.contains(&"https://api.test/y/2/two".to_string()));
        assert_eq!(calls.len(), 5);

        let StoredResult::FannedOut(entries) = &store["c"] else {
            panic!("expected fan-out result for c");
        };
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_dependency_aborts_group() {
        let tech = tech(None);
        let (fetcher, transport) = scripted(vec![]);
        let sink = MemorySink::new();

        // 'b' ordered without its dependency having stored anything.
        let err = run(
            &tech,
            &fetcher,
            &sink,
            &["b"],
            vec![("b", source("/x/{id}", &["a"], &[("id", "a.id")]))],
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::MissingDependencyResult { source_name: source, dependency }
                if source == "b" && dependency == "a"
        ));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_abort_remaining_group() {
        let tech = tech(None);
        let rate_limited = RawResponse {
            status: 429,
            content_type: None,
            body: String::new(),
        };
        let transport = Arc::new(FakeTransport::new(vec![
            Ok(json_response(r#"{"items": [{"id": 1}]}"#)),
            Ok(rate_limited.clone()),
            Ok(rate_limited.clone()),
            Ok(rate_limited.clone()),
            Ok(rate_limited),
        ]));
        let fetcher = Fetcher::new(Arc::clone(&transport) as Arc<dyn ApiTransport>);
        let sink = MemorySink::new();

        let err = run(
            &tech,
            &fetcher,
            &sink,
            &["a", "b"],
            vec![
                ("a", source("/list", &[], &[])),
                ("b", source("/x/{id}", &["a"], &[("id", "a.items.id")])),
            ],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Transient { .. }));
        // Records emitted before the failure stand.
        assert_eq!(sink.records_for("acme.cloudapp.a").len(), 1);
    }

    #[tokio::test]
    async fn test_paginated_root_emits_items_and_stores_merged() {
        let tech = tech(Some(PaginationConfig {
            next_link_key: "next".into(),
            items_key: "items".into(),
        }));
        let (fetcher, _) = scripted(vec![
            r#"{"items": [{"id": 1}], "next": "https://api.test/list?page=2"}"#,
            r#"{"items": [{"id": 2}]}"#,
        ]);
        let sink = MemorySink::new();

        let store = run(
            &tech,
            &fetcher,
            &sink,
            &["a"],
            vec![("a", source("/list", &[], &[]))],
        )
        .await
        .unwrap();

        assert_eq!(sink.records_for("acme.cloudapp.a").len(), 2);
        let StoredResult::Single(merged) = &store["a"] else {
            panic!("expected single result for a");
        };
        assert_eq!(merged["items"], json!([{"id": 1}, {"id": 2}]));
    }

    #[tokio::test]
    async fn test_scalar_dependency_yields_single_variant() {
        let tech = tech(None);
        let (fetcher, transport) = scripted(vec![
            r#"{"token": "abc"}"#,
            r#"{"ok": true}"#,
        ]);
        let sink = MemorySink::new();

        let store = run(
            &tech,
            &fetcher,
            &sink,
            &["session", "data"],
            vec![
                ("session", source("/login", &[], &[])),
                (
                    "data",
                    source("/data/{token}", &["session"], &[("token", "session.token")]),
                ),
            ],
        )
        .await
        .unwrap();

        assert_eq!(
            transport.calls.lock().unwrap()[1],
            "https://api.test/data/abc"
        );
        let StoredResult::FannedOut(entries) = &store["data"] else {
            panic!("expected fan-out result for data");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].extracted, "abc");
    }

    #[tokio::test]
    async fn test_ordering_only_dependent_fetches_once() {
        let tech = tech(None);
        let (fetcher, transport) = scripted(vec![
            r#"{"seeded": true}"#,
            r#"{"report": []}"#,
        ]);
        let sink = MemorySink::new();

        let store = run(
            &tech,
            &fetcher,
            &sink,
            &["seed", "report"],
            vec![
                ("seed", source("/seed", &[], &[])),
                ("report", source("/report", &["seed"], &[])),
            ],
        )
        .await
        .unwrap();

        assert_eq!(transport.call_count(), 2);
        assert!(matches!(store["report"], StoredResult::Single(_)));
    }
}
