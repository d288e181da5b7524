// src/services/paginator.rs

//! Next-link pagination over the fetch primitive.

use std::collections::BTreeMap;

use serde_json::Value;
use url::Url;

use crate::error::Result;
use crate::models::{HttpMethod, PaginationConfig};
use crate::services::{Fetcher, Payload};

/// Drive the fetcher across "next link" pages, accumulating the items arrays.
///
/// The first call carries the source's configured query parameters; every
/// subsequent call uses the server-returned next link with no additional
/// query. Terminates when a page lacks the next-link key or its value is
/// falsy. The returned object is the last page with the items key replaced by
/// the full accumulated sequence. A failed or non-object page mid-run logs
/// and yields `Ok(None)`.
pub async fn paginate(
    fetcher: &Fetcher,
    url: &str,
    method: HttpMethod,
    headers: &BTreeMap<String, String>,
    query: &[(String, String)],
    pagination: &PaginationConfig,
) -> Result<Option<Value>> {
    let mut items: Vec<Value> = Vec::new();
    let mut next_link: Option<String> = None;

    loop {
        let (request_url, request_query): (&str, &[(String, String)]) = match &next_link {
            None => (url, query),
            Some(link) => (link.as_str(), &[]),
        };

        let payload = fetcher
            .fetch(request_url, method, request_query, headers, None)
            .await?;

        let mut page = match payload {
            Some(Payload::Json(Value::Object(map))) => map,
            _ => {
                log::error!(
                    "Failed to retrieve data or unexpected response format from {request_url}"
                );
                return Ok(None);
            }
        };

        if let Some(Value::Array(page_items)) = page.get(&pagination.items_key) {
            items.extend(page_items.iter().cloned());
        }

        let next = match page.get(&pagination.next_link_key) {
            Some(value) if truthy(value) => match value {
                Value::String(link) => Some(resolve_next_link(url, link)),
                other => {
                    log::error!(
                        "Next link '{}' from {request_url} is not a string: {other}",
                        pagination.next_link_key
                    );
                    return Ok(None);
                }
            },
            _ => None,
        };

        match next {
            Some(link) => next_link = Some(link),
            None => {
                page.insert(pagination.items_key.clone(), Value::Array(items));
                return Ok(Some(Value::Object(page)));
            }
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Resolve a possibly-relative next link against the first-page URL.
fn resolve_next_link(base: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }
    Url::parse(base)
        .and_then(|b| b.join(link))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| link.to_string())
}
