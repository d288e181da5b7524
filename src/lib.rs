// src/lib.rs

//! siphon: declarative REST API collector.
//!
//! Pulls data from REST APIs described in a TOML configuration, resolves
//! dependencies between API calls within a technology scope, chains parameter
//! values extracted from one response into the request of another, and emits
//! normalized result records for downstream log ingestion.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod schedule;
pub mod services;
pub mod sink;
pub mod utils;
