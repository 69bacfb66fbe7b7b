//! Progress reporting for one pack load
//!
//! Stages are reported in pipeline order. An event for a stage earlier than
//! one already reported is dropped, as is anything after `ready`.

use crate::manifest::PackManifest;
use crate::protocol::OrchestratorMessage;
use logpack_common::types::{LoadIssue, ProgressEvent, Stage, TableSummary};
use tracing::{debug, warn};

pub struct ProgressReporter<F> {
    sink: F,
    last_stage: Option<Stage>,
}

impl<F> ProgressReporter<F>
where
    F: FnMut(OrchestratorMessage),
{
    pub fn new(sink: F) -> Self {
        Self {
            sink,
            last_stage: None,
        }
    }

    /// Last stage that was reported
    pub fn last_stage(&self) -> Option<Stage> {
        self.last_stage
    }

    fn advance(&mut self, stage: Stage) -> bool {
        match self.last_stage {
            Some(last) if stage < last || last == Stage::Ready => {
                warn!(%stage, %last, "Dropping out-of-order progress event");
                false
            },
            _ => {
                self.last_stage = Some(stage);
                true
            },
        }
    }

    /// Send one event; returns false if it was dropped
    pub fn emit(&mut self, event: ProgressEvent) -> bool {
        if event.stage == Stage::Ready {
            warn!("Ready must be reported with its table summary");
            return false;
        }
        if !self.advance(event.stage) {
            return false;
        }
        debug!(stage = %event.stage, percent = ?event.percent, message = ?event.message, "Progress");
        (self.sink)(OrchestratorMessage::Progress(event));
        true
    }

    pub fn report(&mut self, stage: Stage, percent: u8, message: impl Into<String>) -> bool {
        self.emit(ProgressEvent::new(stage).percent(percent).message(message))
    }

    /// Report byte-level download progress
    pub fn bytes(&mut self, loaded: u64, total: Option<u64>) -> bool {
        let mut event = ProgressEvent::new(Stage::Download).bytes(loaded, total);
        if let Some(total) = total.filter(|t| *t > 0) {
            let percent = (loaded.min(total).saturating_mul(100) / total) as u8;
            event = event.percent(percent);
        }
        self.emit(event)
    }

    /// Terminal event carrying the table summary
    pub fn ready(
        &mut self,
        tables: Vec<TableSummary>,
        issues: Vec<LoadIssue>,
        manifest: Option<PackManifest>,
    ) -> bool {
        if !self.advance(Stage::Ready) {
            return false;
        }
        (self.sink)(OrchestratorMessage::Ready {
            tables,
            issues,
            manifest: manifest.map(Box::new),
        });
        true
    }
}
