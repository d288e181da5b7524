// src/sink/mod.rs

//! Record sinks for emitted results.
//!
//! The collector core calls `emit` once per logical result record; the sink
//! owns the on-disk layout. Rotation and size limits are left to external
//! log shippers.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use file::FileSink;
pub use memory::MemorySink;

/// Destination for normalized result records.
///
/// `qualified_name` is the `entity.technology.source` triple of the source
/// that produced the record.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn emit(&self, qualified_name: &str, record: &Value) -> Result<()>;
}
