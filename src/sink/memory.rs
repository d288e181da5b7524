// src/sink/memory.rs

//! In-memory sink for tests and dry runs.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::sink::RecordSink;

/// Collects emitted records in memory.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<(String, Value)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all emitted records, in emission order.
    pub fn records(&self) -> Vec<(String, Value)> {
        self.records.lock().unwrap().clone()
    }

    /// Records emitted under one qualified name.
    pub fn records_for(&self, qualified_name: &str) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == qualified_name)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn emit(&self, qualified_name: &str, record: &Value) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .push((qualified_name.to_string(), record.clone()));
        Ok(())
    }
}
