//! Messages exchanged between a session and its orchestrator
//!
//! Two closed enums, one per direction, tagged by a `type` field on the wire:
//!
//! ```json
//! {"type":"runQuery","id":"q_5d0c...","sql":"SELECT 1"}
//! {"type":"queryResult","id":"q_5d0c...","columns":[...],"rows":[...]}
//! ```
//!
//! `runQuery` is fire-and-forget; callers correlate the reply through `id`.
//! Every `runQuery` is answered by exactly one `queryResult` or one `error`
//! carrying the same id.

use crate::manifest::PackManifest;
use logpack_common::types::{LoadIssue, ProgressEvent, QueryColumn, QueryResult, TableSummary};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Message has no \"type\" field")]
    MissingType,

    #[error("Unknown message type '{0}'")]
    UnknownType(String),
}

/// Where the orchestrator should take a pack from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Local archive file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Archive bytes handed over in-process; never serialized
    #[serde(skip)]
    pub tar_bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_digest: Option<String>,
}

impl IngestRequest {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            tar_bytes: Some(bytes),
            ..Self::default()
        }
    }

    pub fn expected_digest(mut self, digest: Option<String>) -> Self {
        self.expected_digest = digest;
        self
    }
}

/// Caller to orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CallerMessage {
    Ping,
    Dispose,
    IngestPack(IngestRequest),
    RunQuery { id: String, sql: String },
}

/// Orchestrator to caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OrchestratorMessage {
    Pong,
    Progress(ProgressEvent),
    Error {
        /// Set when the error answers a `runQuery`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        message: String,
    },
    Ready {
        tables: Vec<TableSummary>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        issues: Vec<LoadIssue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        manifest: Option<Box<PackManifest>>,
    },
    QueryResult {
        id: String,
        columns: Vec<QueryColumn>,
        rows: Vec<Map<String, Value>>,
    },
}

const CALLER_TYPES: &[&str] = &["ping", "dispose", "ingestPack", "runQuery"];
const ORCHESTRATOR_TYPES: &[&str] = &["pong", "progress", "error", "ready", "queryResult"];

/// Decode a tagged message, telling unknown tags apart from bad payloads
fn decode_tagged<T: DeserializeOwned>(text: &str, known: &[&str]) -> Result<T, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;
    if !known.contains(&tag) {
        return Err(ProtocolError::UnknownType(tag.to_string()));
    }
    Ok(serde_json::from_value(value)?)
}

impl CallerMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, CALLER_TYPES)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl OrchestratorMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, ORCHESTRATOR_TYPES)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// An error not tied to any query
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            id: None,
            message: message.into(),
        }
    }

    /// The failure reply to one `runQuery`
    pub fn query_error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            id: Some(id.into()),
            message: message.into(),
        }
    }

    pub fn query_result(id: impl Into<String>, result: QueryResult) -> Self {
        Self::QueryResult {
            id: id.into(),
            columns: result.columns,
            rows: result.rows,
        }
    }

    /// Id of the request this message answers, if any
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::QueryResult { id, .. } => Some(id),
            Self::Error { id, .. } => id.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use logpack_common::types::Stage;
    use serde_json::json;

    #[test]
    fn test_decode_caller_messages() {
        assert_eq!(CallerMessage::decode(r#"{"type":"ping"}"#).unwrap(), CallerMessage::Ping);
        assert_eq!(
            CallerMessage::decode(r#"{"type":"runQuery","id":"q_1","sql":"SELECT 1"}"#).unwrap(),
            CallerMessage::RunQuery {
                id: "q_1".to_string(),
                sql: "SELECT 1".to_string()
            }
        );

        let ingest = CallerMessage::decode(
            r#"{"type":"ingestPack","url":"http://localhost/p","expectedDigest":"abc"}"#,
        )
        .unwrap();
        let CallerMessage::IngestPack(request) = ingest else {
            panic!("expected ingestPack");
        };
        assert_eq!(request.url.as_deref(), Some("http://localhost/p"));
        assert_eq!(request.expected_digest.as_deref(), Some("abc"));
        assert!(request.tar_bytes.is_none());
    }

    #[test]
    fn test_decode_rejects_unknown_shapes() {
        assert!(matches!(
            CallerMessage::decode(r#"{"type":"dropEverything"}"#),
            Err(ProtocolError::UnknownType(t)) if t == "dropEverything"
        ));
        assert!(matches!(
            CallerMessage::decode(r#"{"id":"q_1"}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            CallerMessage::decode(r#"{"type":"runQuery","id":"q_1"}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(CallerMessage::decode("not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(
            CallerMessage::decode(r#"{"type":"pong"}"#),
            Err(ProtocolError::UnknownType(_))
        ));
    }

    #[test]
    fn test_tar_bytes_never_cross_the_wire() {
        let message = CallerMessage::IngestPack(IngestRequest::from_bytes(vec![1, 2, 3]));
        assert_eq!(message.encode().unwrap(), r#"{"type":"ingestPack"}"#);
    }

    #[test]
    fn test_encode_orchestrator_messages() {
        let progress = OrchestratorMessage::Progress(
            ProgressEvent::new(Stage::Verify).percent(100).message("Checksum OK"),
        );
        let value: Value = serde_json::from_str(&progress.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "progress", "stage": "verify", "percent": 100, "message": "Checksum OK"})
        );

        let error = OrchestratorMessage::error("No pack data provided");
        assert_eq!(
            error.encode().unwrap(),
            r#"{"type":"error","message":"No pack data provided"}"#
        );

        let ready = OrchestratorMessage::Ready {
            tables: vec![TableSummary {
                name: "cloudtrail_events".to_string(),
                row_count: 2,
                source: None,
            }],
            issues: Vec::new(),
            manifest: None,
        };
        assert_eq!(
            ready.encode().unwrap(),
            r#"{"type":"ready","tables":[{"name":"cloudtrail_events","rowCount":2}]}"#
        );
    }

    #[test]
    fn test_request_id() {
        assert_eq!(OrchestratorMessage::query_error("q_1", "boom").request_id(), Some("q_1"));
        assert_eq!(
            OrchestratorMessage::query_result("q_2", QueryResult::default()).request_id(),
            Some("q_2")
        );
        assert_eq!(OrchestratorMessage::error("boom").request_id(), None);
        assert_eq!(OrchestratorMessage::Pong.request_id(), None);
    }

    #[test]
    fn test_orchestrator_round_trip_through_text() {
        let message = OrchestratorMessage::query_error("q_9", "Catalog Error");
        let decoded = OrchestratorMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }
}
