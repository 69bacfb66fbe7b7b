//! Dataset loader
//!
//! Turns the `logs/` members of a pack into tables:
//!
//! - `vpc_flow_logs` from `logs/**vpc**.csv` via `read_csv_auto`
//! - `cloudtrail_events` from `logs/**cloudtrail**.json[.gz]` via `read_json_auto`
//! - `events_unified`, a best-effort view over whichever of the two exist
//!
//! Every load drops and rebuilds both tables, so reloading within a session is
//! equivalent to loading into a fresh one.

use crate::archive::ArchiveEntry;
use crate::database::{quote_ident, quote_literal, Database};
use crate::decompression::{decompress_gzip, strip_gz_suffix};
use crate::error::Result;
use logpack_common::types::{IssueStep, LoadIssue, LogSource, ProgressEvent, Stage, TableSummary};
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Path prefix of log-bearing members
pub const LOGS_PREFIX: &str = "logs/";

pub const VPC_FLOW_TABLE: &str = "vpc_flow_logs";
pub const CLOUDTRAIL_TABLE: &str = "cloudtrail_events";
pub const UNIFIED_VIEW: &str = "events_unified";

/// Percent reported once every member is registered
const REGISTERED_PERCENT: u8 = 35;

/// One table built from a category of log files
#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    pub source: LogSource,
    /// Human-readable name used in progress messages
    pub label: &'static str,
    /// Engine table function that reads one file of this category
    pub reader: &'static str,
    /// Ingest percent reported once the table is built
    pub percent: u8,
    /// This table's branch of the unified view
    unified_select: &'static str,
    matches: fn(&str) -> bool,
}

impl TableSpec {
    /// Whether a registered member belongs to this table
    pub fn matches(&self, name: &str) -> bool {
        (self.matches)(name)
    }
}

fn is_vpc_flow_file(name: &str) -> bool {
    name.starts_with(LOGS_PREFIX) && name.contains("vpc") && name.to_lowercase().ends_with(".csv")
}

fn is_cloudtrail_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    name.starts_with(LOGS_PREFIX)
        && name.contains("cloudtrail")
        && (lower.ends_with(".json") || lower.ends_with(".json.gz"))
}

pub static TABLE_SPECS: [TableSpec; 2] = [
    TableSpec {
        name: VPC_FLOW_TABLE,
        source: LogSource::VpcFlow,
        label: "VPC Flow",
        reader: "read_csv_auto",
        percent: 65,
        unified_select: "SELECT try_cast(NULL AS TIMESTAMP) AS timestamp, 'vpc_flow' AS provider, \
             srcaddr AS src_ip, dstaddr AS dst_ip, bytes, packets, action, \
             NULL::VARCHAR AS event_name, NULL::VARCHAR AS \"user\" FROM vpc_flow_logs",
        matches: is_vpc_flow_file,
    },
    TableSpec {
        name: CLOUDTRAIL_TABLE,
        source: LogSource::Cloudtrail,
        label: "CloudTrail",
        reader: "read_json_auto",
        percent: 85,
        unified_select: "SELECT try_cast(eventTime AS TIMESTAMP) AS timestamp, 'cloudtrail' AS provider, \
             sourceIPAddress AS src_ip, NULL::VARCHAR AS dst_ip, NULL::BIGINT AS bytes, \
             NULL::BIGINT AS packets, NULL::VARCHAR AS action, eventName AS event_name, \
             userIdentity.userName AS \"user\" FROM cloudtrail_events",
        matches: is_cloudtrail_file,
    },
];

/// A member made available to the engine
#[derive(Debug, Clone)]
struct RegisteredFile {
    name: String,
    path: PathBuf,
}

/// Result of one load
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub tables: Vec<TableSummary>,
    pub issues: Vec<LoadIssue>,
    /// Number of members registered with the engine
    pub registered: usize,
}

impl LoadOutcome {
    fn issue(&mut self, step: IssueStep, subject: impl Into<String>, message: impl ToString) {
        let issue = LoadIssue {
            step,
            subject: subject.into(),
            message: message.to_string(),
        };
        warn!(step = ?issue.step, subject = %issue.subject, message = %issue.message, "Best-effort load step failed");
        self.issues.push(issue);
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Register `logs/` members with the engine, inflating gzip members first.
fn register_members(
    db: &Database,
    entries: Vec<ArchiveEntry>,
    outcome: &mut LoadOutcome,
) -> Result<Vec<RegisteredFile>> {
    let mut registered: Vec<RegisteredFile> = Vec::new();

    for entry in entries.into_iter().filter(|e| e.name.starts_with(LOGS_PREFIX)) {
        let (name, payload) = match strip_gz_suffix(&entry.name) {
            Some(stripped) => match decompress_gzip(&entry.payload) {
                Ok(inflated) => (stripped.to_string(), inflated),
                Err(e) => {
                    outcome.issue(IssueStep::GunzipMember, entry.name.as_str(), e);
                    (entry.name, entry.payload)
                },
            },
            None => (entry.name, entry.payload),
        };

        let path = db.register_file_buffer(&name, &payload)?;
        if registered.iter().any(|r| r.name == name) {
            debug!(name, "Member registered twice, keeping latest payload");
            continue;
        }
        registered.push(RegisteredFile { name, path });
    }

    Ok(registered)
}

fn reader_call(spec: &TableSpec, file: &RegisteredFile) -> String {
    format!("{}({})", spec.reader, quote_literal(&file.path.to_string_lossy()))
}

/// Drop and rebuild one table from its files; returns whether it was created.
fn materialize(db: &Database, spec: &TableSpec, files: &[&RegisteredFile]) -> Result<bool> {
    let table = quote_ident(spec.name);
    db.execute(&format!("DROP TABLE IF EXISTS {};", table))?;

    let Some((first, rest)) = files.split_first() else {
        return Ok(false);
    };

    db.execute(&format!(
        "CREATE TABLE {} AS SELECT * FROM {};",
        table,
        reader_call(spec, first)
    ))?;
    for file in rest {
        db.execute(&format!(
            "INSERT INTO {} SELECT * FROM {};",
            table,
            reader_call(spec, file)
        ))?;
    }

    info!(table = spec.name, files = files.len(), "Materialized table");
    Ok(true)
}

fn build_unified_view(db: &Database, built: &[&TableSpec], outcome: &mut LoadOutcome) {
    if built.is_empty() {
        return;
    }
    let union = built
        .iter()
        .map(|spec| spec.unified_select)
        .collect::<Vec<_>>()
        .join("\nUNION ALL\n");
    let sql = format!("CREATE VIEW {} AS\n{};", quote_ident(UNIFIED_VIEW), union);

    if let Err(e) = db.execute(&sql) {
        outcome.issue(IssueStep::UnifiedView, UNIFIED_VIEW, e);
    }
}

/// Load the `logs/` members of a pack into tables.
///
/// Entries are consumed. Engine failures while creating or appending to a
/// table abort the load; gunzip failures, the unified view and row counting
/// are best-effort and surface as [`LoadIssue`]s.
#[instrument(skip_all, fields(entries = entries.len()))]
pub fn load_entries(
    db: &Database,
    entries: Vec<ArchiveEntry>,
    on_progress: &mut dyn FnMut(ProgressEvent),
) -> Result<LoadOutcome> {
    let mut outcome = LoadOutcome::default();

    let files = register_members(db, entries, &mut outcome)?;
    outcome.registered = files.len();
    on_progress(
        ProgressEvent::new(Stage::Ingest)
            .percent(REGISTERED_PERCENT)
            .message(format!("Registered {} files", files.len())),
    );

    // The view may reference tables about to be dropped.
    if let Err(e) = db.execute(&format!("DROP VIEW IF EXISTS {};", quote_ident(UNIFIED_VIEW))) {
        outcome.issue(IssueStep::UnifiedView, UNIFIED_VIEW, e);
    }

    let mut built: Vec<&TableSpec> = Vec::new();
    for spec in &TABLE_SPECS {
        let matching: Vec<&RegisteredFile> = files.iter().filter(|f| spec.matches(&f.name)).collect();
        if materialize(db, spec, &matching)? {
            on_progress(
                ProgressEvent::new(Stage::Ingest).percent(spec.percent).message(format!(
                    "Ingested {} ({} file{})",
                    spec.label,
                    matching.len(),
                    plural(matching.len())
                )),
            );
            built.push(spec);
        } else {
            debug!(table = spec.name, "No matching files, skipping table");
        }
    }

    build_unified_view(db, &built, &mut outcome);

    for spec in built {
        match db.count_rows(spec.name) {
            Ok(row_count) => outcome.tables.push(TableSummary {
                name: spec.name.to_string(),
                row_count,
                source: Some(spec.source),
            }),
            Err(e) => outcome.issue(IssueStep::RowCount, spec.name, e),
        }
    }

    info!(
        tables = outcome.tables.len(),
        issues = outcome.issues.len(),
        registered = outcome.registered,
        "Load complete"
    );
    Ok(outcome)
}
