// src/pipeline/metadata.rs
//! Reporting sinks for materialization metadata (counts, scores, plots).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::pipeline::asset::AssetKey;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    Float(f64),
    Int(i64),
    Text(String),
    /// Markdown body, possibly embedding an image data URI.
    Markdown(String),
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::Float(v) => write!(f, "{:.4}", v),
            MetadataValue::Int(v) => write!(f, "{}", v),
            MetadataValue::Text(v) => write!(f, "{}", v),
            MetadataValue::Markdown(v) => write!(f, "<markdown, {} bytes>", v.len()),
        }
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// What a sink receives after each asset is materialized.
#[derive(Debug, Clone, Serialize)]
pub struct MaterializationEvent {
    pub run_id: Uuid,
    pub asset: AssetKey,
    pub op: &'static str,
    pub materialized_at: DateTime<Utc>,
    pub data_version: Option<String>,
    pub metadata: Metadata,
}

pub trait MetadataSink: Send + Sync {
    fn record(&self, event: &MaterializationEvent) -> Result<()>;
}

/// Writes events to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl MetadataSink for LogSink {
    fn record(&self, event: &MaterializationEvent) -> Result<()> {
        info!(
            "Materialized {} (op '{}', run {})",
            event.asset, event.op, event.run_id
        );
        for (name, value) in &event.metadata {
            match value {
                MetadataValue::Markdown(_) => debug!("   {}: {}", name, value),
                _ => info!("   {}: {}", name, value),
            }
        }
        Ok(())
    }
}

/// Appends one JSON object per event to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataSink for JsonLinesSink {
    fn record(&self, event: &MaterializationEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("Failed to serialize metadata event")?;
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Metadata sink lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open metadata log {}", self.path.display()))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to write metadata log {}", self.path.display()))?;
        Ok(())
    }
}
