//! Embedded analytic database for one session
//!
//! Wraps an in-memory DuckDB connection together with a private staging
//! directory. Archive members are "registered" by writing them into the
//! staging directory, after which SQL can reference them by path through
//! DuckDB's file readers (`read_csv_auto`, `read_json_auto`).
//!
//! The connection is owned by exactly one orchestrator and dropped with it.

use crate::error::{EngineError, Result};
use chrono::{DateTime, NaiveDate};
use duckdb::types::{TimeUnit, Value as DbValue};
use duckdb::Connection;
use logpack_common::types::{QueryColumn, QueryResult};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Catalog query listing user tables of the in-memory database
const TABLE_CATALOG_SQL: &str =
    "SELECT table_name FROM duckdb_tables() WHERE database_name = 'memory' ORDER BY table_name";

/// Quote a SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub struct Database {
    conn: Connection,
    staging: TempDir,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("staging", &self.staging.path())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open a fresh in-memory database with an empty staging directory
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let staging = tempfile::Builder::new().prefix("logpack-").tempdir()?;
        info!(staging = %staging.path().display(), "Opened in-memory database");
        Ok(Self { conn, staging })
    }

    /// Root of the staging directory
    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Make `payload` readable by the engine under the virtual path `name`.
    ///
    /// Returns the on-disk path to use in SQL. Absolute names and names with
    /// `..` components are rejected.
    pub fn register_file_buffer(&self, name: &str, payload: &[u8]) -> Result<PathBuf> {
        let relative = Path::new(name);
        let is_plain = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !is_plain {
            return Err(EngineError::InvalidMemberPath(name.to_string()));
        }

        let path = self.staging.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, payload)?;
        debug!(name, bytes = payload.len(), "Registered file buffer");
        Ok(path)
    }

    /// Run one or more statements that return no rows
    pub fn execute(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run a query and collect its result set
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        let columns: Vec<QueryColumn> = match rows.as_ref() {
            Some(stmt) => unique_names(stmt.column_names())
                .into_iter()
                .enumerate()
                .map(|(i, name)| QueryColumn {
                    name,
                    data_type: stmt.column_type(i).to_string(),
                })
                .collect(),
            None => Vec::new(),
        };

        let mut result = QueryResult {
            columns,
            rows: Vec::new(),
        };
        while let Some(row) = rows.next()? {
            let mut record = Map::with_capacity(result.columns.len());
            for (i, column) in result.columns.iter().enumerate() {
                let value: DbValue = row.get(i)?;
                record.insert(column.name.clone(), to_json(value));
            }
            result.rows.push(record);
        }

        debug!(rows = result.rows.len(), columns = result.columns.len(), "Query complete");
        Ok(result)
    }

    /// `SELECT COUNT(*)` over one table
    pub fn count_rows(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Names of the tables currently in the catalog
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(TABLE_CATALOG_SQL)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Close the connection and remove the staging directory
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| EngineError::Database(e))?;
        self.staging.close()?;
        info!("Closed database");
        Ok(())
    }
}

/// Suffix repeated column names (`a`, `a_1`, `a_2`) so each keys its own value
fn unique_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(names.len());
    names
        .into_iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut n = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", name, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

// ============================================================================
// Value Conversion
// ============================================================================

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn to_micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

fn timestamp(unit: TimeUnit, raw: i64) -> Value {
    let micros = to_micros(unit, raw);
    DateTime::from_timestamp_micros(micros)
        .map(|ts| Value::String(ts.naive_utc().to_string()))
        .unwrap_or(Value::Null)
}

fn date(days: i32) -> Value {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(days))))
        .map(|d| Value::String(d.to_string()))
        .unwrap_or(Value::Null)
}

/// `[-]HH:MM:SS[.ffffff]`, fraction without trailing zeros
fn clock(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let micros = micros.unsigned_abs();
    let secs = micros / 1_000_000;
    let mut text = format!("{}{:02}:{:02}:{:02}", sign, secs / 3600, secs / 60 % 60, secs % 60);
    let fraction = micros % 1_000_000;
    if fraction != 0 {
        text.push_str(format!(".{:06}", fraction).trim_end_matches('0'));
    }
    text
}

fn plural(n: i32, unit: &str) -> String {
    if n.abs() == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// Interval text as the engine prints it, e.g. `1 year 2 months 3 days 04:05:06`
fn interval(months: i32, days: i32, nanos: i64) -> String {
    let mut parts = Vec::new();
    let (years, months) = (months / 12, months % 12);
    if years != 0 {
        parts.push(plural(years, "year"));
    }
    if months != 0 {
        parts.push(plural(months, "month"));
    }
    if days != 0 {
        parts.push(plural(days, "day"));
    }
    let micros = nanos / 1_000;
    if micros != 0 || parts.is_empty() {
        parts.push(clock(micros));
    }
    parts.join(" ")
}

/// Map keys become object keys: strings as-is, anything else as JSON text
fn map_key(key: DbValue) -> String {
    match to_json(key) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Convert an engine value to JSON
///
/// 128-bit integers that do not fit a JSON number are rendered as strings.
/// Decimals become numbers; times and intervals use the engine's text form.
pub(crate) fn to_json(value: DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Boolean(b) => Value::Bool(b),
        DbValue::TinyInt(n) => Value::from(n),
        DbValue::SmallInt(n) => Value::from(n),
        DbValue::Int(n) => Value::from(n),
        DbValue::BigInt(n) => Value::from(n),
        DbValue::HugeInt(n) => i64::try_from(n)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(n.to_string())),
        DbValue::UTinyInt(n) => Value::from(n),
        DbValue::USmallInt(n) => Value::from(n),
        DbValue::UInt(n) => Value::from(n),
        DbValue::UBigInt(n) => Value::from(n),
        DbValue::Float(f) => float(f64::from(f)),
        DbValue::Double(f) => float(f),
        DbValue::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map_or(Value::String(text), Value::Number)
        },
        DbValue::Text(s) | DbValue::Enum(s) => Value::String(s),
        DbValue::Blob(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        DbValue::Timestamp(unit, raw) => timestamp(unit, raw),
        DbValue::Date32(days) => date(days),
        DbValue::Time64(unit, raw) => Value::String(clock(to_micros(unit, raw))),
        DbValue::Interval { months, days, nanos } => Value::String(interval(months, days, nanos)),
        DbValue::List(items) | DbValue::Array(items) => {
            Value::Array(items.into_iter().map(to_json).collect())
        },
        DbValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (map_key(k.clone()), to_json(v.clone())))
                .collect(),
        ),
        DbValue::Union(inner) => to_json(*inner),
        DbValue::Struct(fields) => Value::Object(
            fields
                .keys()
                .cloned()
                .zip(fields.values().cloned().map(to_json))
                .collect(),
        ),
    }
}
