//! Common types used across LogPack

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A phase of the ingestion pipeline.
///
/// Variants are declared in pipeline order, so `Ord` follows the order in which
/// stages may be reported for one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Download,
    Verify,
    Extract,
    Ingest,
    Ready,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Download => write!(f, "download"),
            Stage::Verify => write!(f, "verify"),
            Stage::Extract => write!(f, "extract"),
            Stage::Ingest => write!(f, "ingest"),
            Stage::Ready => write!(f, "ready"),
        }
    }
}

/// One progress checkpoint of a pack load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            percent: None,
            loaded_bytes: None,
            total_bytes: None,
            message: None,
        }
    }

    /// Set the completion percentage, clamped to 100
    pub fn percent(mut self, percent: u8) -> Self {
        self.percent = Some(percent.min(100));
        self
    }

    pub fn bytes(mut self, loaded: u64, total: Option<u64>) -> Self {
        self.loaded_bytes = Some(loaded);
        self.total_bytes = total;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Log source a table was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    VpcFlow,
    Cloudtrail,
}

impl std::fmt::Display for LogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogSource::VpcFlow => write!(f, "vpc_flow"),
            LogSource::Cloudtrail => write!(f, "cloudtrail"),
        }
    }
}

/// A materialized table and its row count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub name: String,
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<LogSource>,
}

/// Which best-effort step of a load failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStep {
    GunzipMember,
    UnifiedView,
    RowCount,
}

/// A best-effort step that failed without aborting the load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadIssue {
    pub step: IssueStep,
    /// Member, view or table the step was working on
    pub subject: String,
    pub message: String,
}

/// Name and engine type of a result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Rows returned by an ad-hoc query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<QueryColumn>,
    pub rows: Vec<Map<String, Value>>,
}

impl QueryResult {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Value of `column` in row `row`, if both exist
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}
