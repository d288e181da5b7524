// src/pipeline/process.rs

//! Execution of a single source against its technology scope.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{HttpMethod, SourceConfig, TechnologyConfig};
use crate::services::{Fetcher, paginate};
use crate::sink::RecordSink;
use crate::utils::join_url;

/// Everything a source execution needs from its scope.
pub struct SourceContext<'a> {
    pub entity: &'a str,
    pub technology: &'a str,
    pub tech: &'a TechnologyConfig,
    pub fetcher: &'a Fetcher,
    pub sink: &'a dyn RecordSink,
}

impl SourceContext<'_> {
    /// Qualified name of a source in this scope.
    pub fn qualified(&self, source_name: &str) -> String {
        format!("{}.{}.{}", self.entity, self.technology, source_name)
    }

    /// Request headers for this scope: bearer injection first, then the
    /// source's static headers (source headers win on conflict).
    pub fn headers(&self, source: &SourceConfig) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if self.tech.uses_bearer() {
            if let Some(token) = &self.tech.api_token {
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
        }
        headers.extend(source.headers.clone());
        headers
    }

    /// Absolute URL for an endpoint (template or substituted variant).
    pub fn url(&self, endpoint: &str) -> String {
        join_url(&self.tech.base_url, endpoint)
    }
}

/// Run one isolated source: paginate the endpoint and emit each merged item.
///
/// Isolated sources require a pagination descriptor on their technology;
/// without one the run fails fast with [`AppError::PaginationUnsupported`]
/// rather than attempting a single unpaginated fetch.
pub async fn run_isolated_source(
    ctx: &SourceContext<'_>,
    source_name: &str,
    source: &SourceConfig,
    query: &[(String, String)],
) -> Result<()> {
    let Some(pagination) = &ctx.tech.pagination else {
        return Err(AppError::PaginationUnsupported {
            technology: ctx.technology.to_string(),
        });
    };

    let method = HttpMethod::parse(&source.method)?;
    let url = ctx.url(&source.endpoint);
    let headers = ctx.headers(source);

    let merged = paginate(ctx.fetcher, &url, method, &headers, query, pagination).await?;
    let Some(merged) = merged else {
        log::warn!("No data returned for {}", ctx.qualified(source_name));
        return Ok(());
    };

    emit_merged(ctx, source_name, &merged).await
}

/// Emit a pagination-merged response: one record per element of the items
/// array. A response without the items array is emitted as a single record.
pub async fn emit_merged(
    ctx: &SourceContext<'_>,
    source_name: &str,
    merged: &Value,
) -> Result<()> {
    let qualified = ctx.qualified(source_name);

    if let Some(pagination) = &ctx.tech.pagination {
        if let Some(Value::Array(items)) = merged.get(&pagination.items_key) {
            for item in items {
                ctx.sink.emit(&qualified, item).await?;
            }
            return Ok(());
        }
    }
    ctx.sink.emit(&qualified, merged).await
}
