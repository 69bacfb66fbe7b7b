//! Ingestion orchestrator
//!
//! Runs one pack load and then serves queries against the resulting database.
//! The orchestrator lives on a dedicated blocking thread and talks to its
//! caller only through two channels:
//!
//! ```text
//!   caller ──CallerMessage──▶ orchestrator ──OrchestratorMessage──▶ caller
//! ```
//!
//! Messages are processed strictly in arrival order. A load moves through
//! `Idle → Downloading → Verifying → Extracting → Ingesting → Ready`, or to
//! `Failed` from any of those; there is no way back to `Idle`.

use crate::api::PackClient;
use crate::archive::parse_tar;
use crate::database::Database;
use crate::decompression::decompress_gzip;
use crate::error::{EngineError, Result};
use crate::loader::load_entries;
use crate::manifest::find_manifest;
use crate::progress::ProgressReporter;
use crate::protocol::{CallerMessage, IngestRequest, OrchestratorMessage};
use logpack_common::checksum::verify_digest;
use logpack_common::types::{ProgressEvent, Stage};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Where a load currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Downloading,
    Verifying,
    Extracting,
    Ingesting,
    Ready,
    Failed,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoadState::Idle => "idle",
            LoadState::Downloading => "downloading",
            LoadState::Verifying => "verifying",
            LoadState::Extracting => "extracting",
            LoadState::Ingesting => "ingesting",
            LoadState::Ready => "ready",
            LoadState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Caller's end of a running orchestrator
#[derive(Debug)]
pub struct OrchestratorHandle {
    sender: UnboundedSender<CallerMessage>,
    task: Option<JoinHandle<()>>,
}

impl OrchestratorHandle {
    /// Queue a message; fails once the orchestrator has shut down
    pub fn send(&self, message: CallerMessage) -> Result<()> {
        self.sender.send(message).map_err(|_| EngineError::SessionClosed)
    }

    /// Handle over a bare channel, with no orchestrator thread behind it
    #[cfg(test)]
    pub(crate) fn from_sender(sender: UnboundedSender<CallerMessage>) -> Self {
        Self { sender, task: None }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Wait for the orchestrator thread to exit
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Orchestrator thread panicked");
            }
        }
    }
}

/// Start an orchestrator on a blocking thread.
///
/// Must be called from within a Tokio runtime; URL downloads are driven on
/// that runtime. The returned receiver yields every reply, in order, and
/// closes once the orchestrator exits.
pub fn spawn(client: PackClient) -> (OrchestratorHandle, UnboundedReceiver<OrchestratorMessage>) {
    let (caller_tx, caller_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();

    let orchestrator = Orchestrator {
        state: LoadState::Idle,
        db: None,
        client,
        runtime: Handle::current(),
        outbox: reply_tx,
    };
    let task = tokio::task::spawn_blocking(move || orchestrator.run(caller_rx));

    (
        OrchestratorHandle {
            sender: caller_tx,
            task: Some(task),
        },
        reply_rx,
    )
}

struct Orchestrator {
    state: LoadState,
    db: Option<Database>,
    client: PackClient,
    runtime: Handle,
    outbox: UnboundedSender<OrchestratorMessage>,
}

impl Orchestrator {
    fn run(mut self, mut inbox: UnboundedReceiver<CallerMessage>) {
        debug!("Orchestrator started");
        while let Some(message) = inbox.blocking_recv() {
            match message {
                CallerMessage::Ping => self.send(OrchestratorMessage::Pong),
                CallerMessage::Dispose => break,
                CallerMessage::IngestPack(request) => self.ingest(request),
                CallerMessage::RunQuery { id, sql } => self.run_query(id, &sql),
            }
        }
        self.dispose();
        debug!("Orchestrator stopped");
    }

    fn send(&self, message: OrchestratorMessage) {
        if self.outbox.send(message).is_err() {
            debug!("Caller went away, dropping reply");
        }
    }

    fn ingest(&mut self, request: IngestRequest) {
        if self.state != LoadState::Idle {
            warn!(state = %self.state, "Rejecting second pack load");
            self.send(OrchestratorMessage::error(
                EngineError::LoadRejected(self.state.to_string()).to_string(),
            ));
            return;
        }

        if let Err(e) = self.load(request) {
            error!(error = %e, state = %self.state, "Pack load failed");
            self.state = LoadState::Failed;
            self.send(OrchestratorMessage::error(e.to_string()));
        }
    }

    /// Read the archive from whichever source the request names
    fn acquire(
        &self,
        request: &mut IngestRequest,
        reporter: &mut ProgressReporter<impl FnMut(OrchestratorMessage)>,
    ) -> Result<Vec<u8>> {
        let (bytes, message) = if let Some(bytes) = request.tar_bytes.take() {
            (bytes, "Received pack".to_string())
        } else if let Some(path) = &request.path {
            let bytes = std::fs::read(path)?;
            (bytes, format!("Read {}", path.display()))
        } else if let Some(url) = &request.url {
            reporter.report(Stage::Download, 0, "Starting download");
            let bytes = self
                .runtime
                .block_on(self.client.fetch_url(url, |loaded, total| {
                    reporter.bytes(loaded, total);
                }))?;
            (bytes, "Downloaded pack".to_string())
        } else {
            return Err(EngineError::NoPackData);
        };

        let size = bytes.len() as u64;
        reporter.emit(
            ProgressEvent::new(Stage::Download)
                .percent(100)
                .bytes(size, Some(size))
                .message(message),
        );
        Ok(bytes)
    }

    #[instrument(skip_all)]
    fn load(&mut self, mut request: IngestRequest) -> Result<()> {
        let outbox = self.outbox.clone();
        let mut reporter = ProgressReporter::new(move |message| {
            if outbox.send(message).is_err() {
                debug!("Caller went away, dropping progress");
            }
        });

        self.state = LoadState::Downloading;
        let packed = self.acquire(&mut request, &mut reporter)?;

        self.state = LoadState::Verifying;
        let integrity = verify_digest(&packed, request.expected_digest.as_deref())?.into_result()?;
        let size = packed.len() as u64;
        let verify_message = if integrity.is_verified() {
            "Checksum OK"
        } else {
            "No expected digest, skipping verification"
        };
        reporter.emit(
            ProgressEvent::new(Stage::Verify)
                .percent(100)
                .bytes(size, Some(size))
                .message(verify_message),
        );
        info!(digest = %integrity.actual_digest, verified = integrity.is_verified(), "Integrity checked");

        self.state = LoadState::Extracting;
        reporter.report(Stage::Extract, 5, "Decompressing gzip");
        let tar = decompress_gzip(&packed)?;
        drop(packed);
        reporter.report(Stage::Extract, 25, "Parsing tar");
        let entries = parse_tar(&tar);
        drop(tar);
        let manifest = find_manifest(&entries)?;
        reporter.report(Stage::Extract, 100, format!("Extracted {} entries", entries.len()));

        self.state = LoadState::Ingesting;
        reporter.report(Stage::Ingest, 5, "Initializing DuckDB");
        let db = Database::open_in_memory()?;
        let outcome = load_entries(&db, entries, &mut |event| {
            reporter.emit(event);
        })?;
        reporter.report(Stage::Ingest, 100, "Ingest complete");

        self.db = Some(db);
        self.state = LoadState::Ready;
        info!(tables = outcome.tables.len(), "Pack ready");
        reporter.ready(outcome.tables, outcome.issues, Some(manifest));
        Ok(())
    }

    fn run_query(&self, id: String, sql: &str) {
        let reply = match (&self.db, self.state) {
            (Some(db), LoadState::Ready) => match db.query(sql) {
                Ok(result) => OrchestratorMessage::query_result(id, result),
                Err(e) => {
                    debug!(id, error = %e, "Query failed");
                    OrchestratorMessage::query_error(id, e.to_string())
                },
            },
            _ => OrchestratorMessage::query_error(id, EngineError::NotReady.to_string()),
        };
        self.send(reply);
    }

    fn dispose(&mut self) {
        if let Some(db) = self.db.take() {
            if let Err(e) = db.close() {
                warn!(error = %e, "Failed to close database cleanly");
            }
        }
    }
}
