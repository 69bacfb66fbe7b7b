//! Caller-side sessions
//!
//! A [`Session`] owns one orchestrator and multiplexes concurrent queries over
//! it. Each query gets a unique id and a pending entry; a router task reads the
//! orchestrator's replies and resolves the matching entry. Queries that stay
//! unanswered past the timeout fail, and a reply arriving later is dropped.
//!
//! [`SessionManager`] opens sessions for packs served by the pack server or
//! supplied locally, replacing the previous session each time.

use crate::api::{PackClient, PackMeta};
use crate::cache::MetaCache;
use crate::config::SessionConfig;
use crate::database::quote_ident;
use crate::error::{EngineError, Result};
use crate::export::to_csv;
use crate::loader::TABLE_SPECS;
use crate::manifest::PackManifest;
use crate::orchestrator::{self, OrchestratorHandle};
use crate::protocol::{CallerMessage, IngestRequest, OrchestratorMessage};
use logpack_common::types::{LoadIssue, ProgressEvent, QueryResult, TableSummary};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const TABLE_CATALOG_SQL: &str =
    "SELECT table_name FROM duckdb_tables() WHERE database_name = 'memory' ORDER BY table_name";

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Result<QueryResult>>>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Result<QueryResult>>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fail every outstanding query
fn fail_pending(pending: &PendingMap) {
    let drained: Vec<_> = lock(pending).drain().collect();
    for (id, tx) in drained {
        debug!(id, "Failing pending query");
        let _ = tx.send(Err(EngineError::SessionClosed));
    }
}

/// What a successful load produced
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub tables: Vec<TableSummary>,
    pub issues: Vec<LoadIssue>,
    pub manifest: Option<PackManifest>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Loading,
    Ready(LoadSummary),
    Failed(String),
}

/// Route orchestrator replies until the orchestrator exits
async fn route<F>(
    mut replies: UnboundedReceiver<OrchestratorMessage>,
    pending: PendingMap,
    status: watch::Sender<LoadStatus>,
    mut on_progress: F,
) where
    F: FnMut(ProgressEvent),
{
    while let Some(message) = replies.recv().await {
        match message {
            OrchestratorMessage::Progress(event) => on_progress(event),
            OrchestratorMessage::Ready {
                tables,
                issues,
                manifest,
            } => {
                status.send_replace(LoadStatus::Ready(LoadSummary {
                    tables,
                    issues,
                    manifest: manifest.map(|m| *m),
                }));
            },
            OrchestratorMessage::QueryResult { id, columns, rows } => {
                resolve(&pending, &id, Ok(QueryResult { columns, rows }));
            },
            OrchestratorMessage::Error {
                id: Some(id),
                message,
            } => {
                let err = EngineError::QueryFailed {
                    id: id.clone(),
                    message,
                };
                resolve(&pending, &id, Err(err));
            },
            OrchestratorMessage::Error { id: None, message } => {
                let loading = matches!(*status.borrow(), LoadStatus::Loading);
                if loading {
                    status.send_replace(LoadStatus::Failed(message));
                } else {
                    warn!(%message, "Orchestrator error");
                }
            },
            OrchestratorMessage::Pong => debug!("Pong"),
        }
    }

    fail_pending(&pending);
    status.send_if_modified(|current| {
        if matches!(current, LoadStatus::Loading) {
            *current = LoadStatus::Failed(EngineError::SessionClosed.to_string());
            true
        } else {
            false
        }
    });
    debug!("Session router stopped");
}

fn resolve(pending: &PendingMap, id: &str, result: Result<QueryResult>) {
    match lock(pending).remove(id) {
        Some(tx) => {
            if tx.send(result).is_err() {
                debug!(id, "Query caller went away");
            }
        },
        None => debug!(id, "Dropping reply for unknown or timed-out query"),
    }
}

/// One pack load and the queries served from it
pub struct Session {
    orchestrator: OrchestratorHandle,
    pending: PendingMap,
    status: watch::Receiver<LoadStatus>,
    router: Option<JoinHandle<()>>,
    query_timeout: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("status", &*self.status.borrow())
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start an orchestrator and ask it to load `request`.
    ///
    /// Progress events are handed to `on_progress` as they arrive.
    pub fn start<F>(
        client: PackClient,
        request: IngestRequest,
        query_timeout: Duration,
        on_progress: F,
    ) -> Result<Self>
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        let (handle, replies) = orchestrator::spawn(client);
        Self::attach(handle, replies, request, query_timeout, on_progress)
    }

    /// Drive an already running orchestrator
    pub fn attach<F>(
        orchestrator: OrchestratorHandle,
        replies: UnboundedReceiver<OrchestratorMessage>,
        request: IngestRequest,
        query_timeout: Duration,
        on_progress: F,
    ) -> Result<Self>
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (status_tx, status_rx) = watch::channel(LoadStatus::Loading);
        let router = tokio::spawn(route(replies, Arc::clone(&pending), status_tx, on_progress));

        orchestrator.send(CallerMessage::IngestPack(request))?;

        Ok(Self {
            orchestrator,
            pending,
            status: status_rx,
            router: Some(router),
            query_timeout,
        })
    }

    pub fn status(&self) -> LoadStatus {
        self.status.borrow().clone()
    }

    /// Wait for the load to finish
    pub async fn wait_ready(&self) -> Result<LoadSummary> {
        let mut status = self.status.clone();
        let settled = status
            .wait_for(|s| !matches!(s, LoadStatus::Loading))
            .await
            .map_err(|_| EngineError::SessionClosed)?;
        match &*settled {
            LoadStatus::Ready(summary) => Ok(summary.clone()),
            LoadStatus::Failed(message) => Err(EngineError::LoadFailed(message.clone())),
            LoadStatus::Loading => Err(EngineError::SessionClosed),
        }
    }

    /// Run a query and wait for its result
    #[instrument(skip(self, sql))]
    pub async fn run_query(&self, sql: &str) -> Result<QueryResult> {
        let id = format!("q_{}", Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id.clone(), tx);

        let request = CallerMessage::RunQuery {
            id: id.clone(),
            sql: sql.to_string(),
        };
        if let Err(e) = self.orchestrator.send(request) {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.query_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(EngineError::SessionClosed),
            Err(_) => {
                lock(&self.pending).remove(&id);
                warn!(id, timeout_secs = self.query_timeout.as_secs_f64(), "Query timed out");
                Err(EngineError::QueryTimeout {
                    id,
                    timeout: self.query_timeout,
                })
            },
        }
    }

    /// Run a query and render its result as CSV
    pub async fn export_csv(&self, sql: &str) -> Result<String> {
        let result = self.run_query(sql).await?;
        Ok(to_csv(&result))
    }

    /// Tables currently materialized, with row counts.
    ///
    /// Returns an empty list if the catalog cannot be read; tables whose count
    /// fails are left out.
    pub async fn list_tables(&self) -> Vec<TableSummary> {
        let catalog = match self.run_query(TABLE_CATALOG_SQL).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Failed to read table catalog");
                return Vec::new();
            },
        };

        let names: Vec<String> = catalog
            .rows
            .iter()
            .filter_map(|row| row.get("table_name").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let sql = format!("SELECT COUNT(*) AS row_count FROM {}", quote_ident(&name));
            let counted = self.run_query(&sql).await.map(|r| r.value(0, "row_count").and_then(Value::as_u64));
            match counted {
                Ok(Some(row_count)) => {
                    let source = TABLE_SPECS.iter().find(|s| s.name == name).map(|s| s.source);
                    tables.push(TableSummary {
                        name,
                        row_count,
                        source,
                    });
                },
                Ok(None) => warn!(table = %name, "Row count missing from result"),
                Err(e) => warn!(table = %name, error = %e, "Failed to count rows"),
            }
        }
        tables
    }

    /// Shut the orchestrator down and wait for it to exit.
    ///
    /// Pending queries fail with [`EngineError::SessionClosed`].
    pub async fn close(mut self) {
        let _ = self.orchestrator.send(CallerMessage::Dispose);
        fail_pending(&self.pending);
        self.orchestrator.join().await;
        if let Some(router) = self.router.take() {
            let _ = router.await;
        }
        info!("Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.orchestrator.send(CallerMessage::Dispose);
        fail_pending(&self.pending);
    }
}

// ============================================================================
// Session Manager
// ============================================================================

/// Opens sessions and keeps at most one alive
pub struct SessionManager {
    config: SessionConfig,
    client: PackClient,
    cache: MetaCache,
    current: Option<Session>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let client = PackClient::new(&config)?;
        let cache = MetaCache::new(config.meta_cache_ttl_minutes);
        Ok(Self {
            config,
            client,
            cache,
            current: None,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(SessionConfig::from_env()?)
    }

    /// Replace the metadata cache
    pub fn with_cache(mut self, cache: MetaCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn client(&self) -> &PackClient {
        &self.client
    }

    pub fn cache_mut(&mut self) -> &mut MetaCache {
        &mut self.cache
    }

    /// Pack metadata, from the cache when fresh
    pub async fn pack_meta(&mut self, pack_id: &str) -> Result<PackMeta> {
        if let Some(meta) = self.cache.get(pack_id) {
            return Ok(meta);
        }
        let meta = self.client.fetch_meta(pack_id).await?;
        self.cache.insert(meta.clone());
        Ok(meta)
    }

    /// Load a pack from the server into a new session.
    ///
    /// The archive is verified against the digest the server publishes.
    pub async fn open_pack<F>(&mut self, pack_id: &str, on_progress: F) -> Result<&Session>
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        let meta = self.pack_meta(pack_id).await?;
        let expected = meta.sha256.filter(|d| !d.trim().is_empty());
        info!(pack_id, verified = expected.is_some(), "Opening pack");

        let request = IngestRequest::from_url(self.client.download_url(pack_id)).expected_digest(expected);
        self.open(request, on_progress).await
    }

    /// Load an archive already held in memory
    pub async fn open_bytes<F>(
        &mut self,
        bytes: Vec<u8>,
        expected_digest: Option<String>,
        on_progress: F,
    ) -> Result<&Session>
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        let request = IngestRequest::from_bytes(bytes).expected_digest(expected_digest);
        self.open(request, on_progress).await
    }

    /// Load a local archive file
    pub async fn open_file<F>(
        &mut self,
        path: impl Into<PathBuf>,
        expected_digest: Option<String>,
        on_progress: F,
    ) -> Result<&Session>
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        let request = IngestRequest::from_path(path).expected_digest(expected_digest);
        self.open(request, on_progress).await
    }

    async fn open<F>(&mut self, request: IngestRequest, on_progress: F) -> Result<&Session>
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        self.dispose_current().await;
        let session = Session::start(
            self.client.clone(),
            request,
            self.config.query_timeout,
            on_progress,
        )?;
        Ok(self.current.insert(session))
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Close the current session, if any
    pub async fn dispose_current(&mut self) {
        if let Some(session) = self.current.take() {
            session.close().await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use logpack_common::types::{QueryColumn, Stage};
    use serde_json::{json, Map};
    use tokio::sync::mpsc::{self, UnboundedSender};

    /// A session whose orchestrator is played by the test
    struct Harness {
        session: Session,
        requests: UnboundedReceiver<CallerMessage>,
        replies: UnboundedSender<OrchestratorMessage>,
    }

    fn harness(timeout: Duration) -> Harness {
        harness_with_progress(timeout, |_| {})
    }

    fn harness_with_progress<F>(timeout: Duration, on_progress: F) -> Harness
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        let (caller_tx, requests) = mpsc::unbounded_channel();
        let (replies, reply_rx) = mpsc::unbounded_channel();
        let session = Session::attach(
            OrchestratorHandle::from_sender(caller_tx),
            reply_rx,
            IngestRequest::default(),
            timeout,
            on_progress,
        )
        .unwrap();
        Harness {
            session,
            requests,
            replies,
        }
    }

    /// Next `runQuery` the session sent
    async fn next_query(requests: &mut UnboundedReceiver<CallerMessage>) -> (String, String) {
        loop {
            match requests.recv().await {
                Some(CallerMessage::RunQuery { id, sql }) => return (id, sql),
                Some(_) => continue,
                None => panic!("session stopped sending"),
            }
        }
    }

    fn rows(values: Vec<serde_json::Value>) -> QueryResult {
        let rows: Vec<Map<String, serde_json::Value>> = values
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        let columns = rows
            .first()
            .map(|r| {
                r.keys()
                    .map(|k| QueryColumn {
                        name: k.clone(),
                        data_type: "Utf8".to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        QueryResult { columns, rows }
    }

    #[tokio::test]
    async fn test_query_ids_are_prefixed_and_unique() {
        let Harness {
            session,
            mut requests,
            replies,
        } = harness(Duration::from_secs(30));

        let first = session.run_query("SELECT 1");
        let second = session.run_query("SELECT 2");
        let orchestrator = async {
            let (a, sql_a) = next_query(&mut requests).await;
            let (b, sql_b) = next_query(&mut requests).await;
            assert!(a.starts_with("q_") && b.starts_with("q_"));
            assert_ne!(a, b);
            // Answer out of order.
            replies
                .send(OrchestratorMessage::query_result(b, rows(vec![json!({"sql": sql_b})])))
                .unwrap();
            replies
                .send(OrchestratorMessage::query_result(a, rows(vec![json!({"sql": sql_a})])))
                .unwrap();
        };

        let (first, second, ()) = tokio::join!(first, second, orchestrator);
        assert_eq!(first.unwrap().value(0, "sql"), Some(&json!("SELECT 1")));
        assert_eq!(second.unwrap().value(0, "sql"), Some(&json!("SELECT 2")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_result_is_dropped() {
        let Harness {
            session,
            mut requests,
            replies,
        } = harness(Duration::from_secs(30));

        let err = session.run_query("SELECT slow()").await.unwrap_err();
        let EngineError::QueryTimeout { id, timeout } = err else {
            panic!("expected a timeout");
        };
        assert_eq!(timeout, Duration::from_secs(30));
        assert!(lock(&session.pending).is_empty());

        let (sent, _) = next_query(&mut requests).await;
        assert_eq!(sent, id);
        replies
            .send(OrchestratorMessage::query_result(id, QueryResult::default()))
            .unwrap();
        tokio::task::yield_now().await;
        assert!(lock(&session.pending).is_empty());

        // The session keeps serving queries.
        let query = session.run_query("SELECT 1");
        let orchestrator = async {
            let (id, _) = next_query(&mut requests).await;
            replies
                .send(OrchestratorMessage::query_result(id, rows(vec![json!({"x": 1})])))
                .unwrap();
        };
        let (result, ()) = tokio::join!(query, orchestrator);
        assert_eq!(result.unwrap().rows.len(), 1);
    }

    #[tokio::test]
    async fn test_query_error_resolves_only_that_request() {
        let Harness {
            session,
            mut requests,
            replies,
        } = harness(Duration::from_secs(30));

        let query = session.run_query("SELEC 1");
        let orchestrator = async {
            let (id, _) = next_query(&mut requests).await;
            replies
                .send(OrchestratorMessage::query_error(id, "Parser Error: syntax error"))
                .unwrap();
        };
        let (result, ()) = tokio::join!(query, orchestrator);
        match result.unwrap_err() {
            EngineError::QueryFailed { id, message } => {
                assert!(id.starts_with("q_"));
                assert!(message.contains("syntax error"));
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(lock(&session.pending).is_empty());
    }

    #[tokio::test]
    async fn test_pending_queries_fail_when_orchestrator_exits() {
        let Harness {
            session,
            mut requests,
            replies,
        } = harness(Duration::from_secs(30));

        let query = session.run_query("SELECT 1");
        let orchestrator = async move {
            next_query(&mut requests).await;
            drop(replies);
            requests
        };
        let (result, _requests) = tokio::join!(query, orchestrator);
        assert!(matches!(result, Err(EngineError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_wait_ready_reports_summary_and_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let Harness {
            session,
            mut requests,
            replies,
        } = harness_with_progress(Duration::from_secs(30), move |e| sink.lock().unwrap().push(e.stage));

        assert!(matches!(requests.recv().await, Some(CallerMessage::IngestPack(_))));
        assert_eq!(session.status(), LoadStatus::Loading);

        replies
            .send(OrchestratorMessage::Progress(ProgressEvent::new(Stage::Download).percent(100)))
            .unwrap();
        replies
            .send(OrchestratorMessage::Ready {
                tables: vec![TableSummary {
                    name: "vpc_flow_logs".to_string(),
                    row_count: 2,
                    source: None,
                }],
                issues: Vec::new(),
                manifest: None,
            })
            .unwrap();

        let summary = session.wait_ready().await.unwrap();
        assert_eq!(summary.tables[0].row_count, 2);
        assert_eq!(*seen.lock().unwrap(), vec![Stage::Download]);
    }

    #[tokio::test]
    async fn test_load_error_fails_session() {
        let Harness { session, replies, .. } = harness(Duration::from_secs(30));
        replies
            .send(OrchestratorMessage::error("SHA-256 mismatch. expected=00 got=11"))
            .unwrap();

        match session.wait_ready().await.unwrap_err() {
            EngineError::LoadFailed(message) => assert!(message.starts_with("SHA-256 mismatch")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_list_tables_skips_failed_counts() {
        let Harness {
            session,
            mut requests,
            replies,
        } = harness(Duration::from_secs(30));

        let listing = session.list_tables();
        let orchestrator = async {
            let (id, sql) = next_query(&mut requests).await;
            assert!(sql.contains("duckdb_tables()"));
            replies
                .send(OrchestratorMessage::query_result(
                    id,
                    rows(vec![json!({"table_name": "broken"}), json!({"table_name": "vpc_flow_logs"})]),
                ))
                .unwrap();

            let (id, sql) = next_query(&mut requests).await;
            assert!(sql.contains("\"broken\""));
            replies
                .send(OrchestratorMessage::query_error(id, "Catalog Error"))
                .unwrap();

            let (id, _) = next_query(&mut requests).await;
            replies
                .send(OrchestratorMessage::query_result(id, rows(vec![json!({"row_count": 3})])))
                .unwrap();
        };

        let (tables, ()) = tokio::join!(listing, orchestrator);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "vpc_flow_logs");
        assert_eq!(tables[0].row_count, 3);
        assert_eq!(tables[0].source, Some(logpack_common::types::LogSource::VpcFlow));
    }

    #[tokio::test]
    async fn test_list_tables_is_empty_when_catalog_fails() {
        let Harness {
            session,
            mut requests,
            replies,
        } = harness(Duration::from_secs(30));

        let listing = session.list_tables();
        let orchestrator = async {
            let (id, _) = next_query(&mut requests).await;
            replies
                .send(OrchestratorMessage::query_error(id, "Database not initialized"))
                .unwrap();
        };
        let (tables, ()) = tokio::join!(listing, orchestrator);
        assert!(tables.is_empty());
    }

    #[tokio::test]
    async fn test_export_csv_quotes_fields() {
        let Harness {
            session,
            mut requests,
            replies,
        } = harness(Duration::from_secs(30));

        let export = session.export_csv("SELECT note FROM t");
        let orchestrator = async {
            let (id, _) = next_query(&mut requests).await;
            replies
                .send(OrchestratorMessage::query_result(id, rows(vec![json!({"note": "a,b"})])))
                .unwrap();
        };
        let (csv, ()) = tokio::join!(export, orchestrator);
        assert_eq!(csv.unwrap(), "note\n\"a,b\"");
    }
}
