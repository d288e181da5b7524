// src/services/mod.rs

//! HTTP services: the retrying fetcher and the next-link paginator.

pub mod fetcher;
pub mod paginator;

pub use fetcher::{ApiRequest, ApiTransport, Fetcher, HttpTransport, Payload, RawResponse};
pub use paginator::paginate;
