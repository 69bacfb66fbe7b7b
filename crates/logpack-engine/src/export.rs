//! Delimited-text rendering of query results

use logpack_common::types::QueryResult;
use serde_json::Value;

/// Render a value for display: strings unquoted, nested values as JSON
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Escape one CSV field
///
/// Fields containing a comma, quote or line break are quoted with internal
/// quotes doubled.
pub fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render a result as CSV: a header line, then one line per row.
///
/// Lines are joined by `\n` with no trailing newline. Null and missing values
/// become empty fields.
pub fn to_csv(result: &QueryResult) -> String {
    let mut lines = Vec::with_capacity(result.rows.len() + 1);
    lines.push(
        result
            .column_names()
            .map(csv_escape)
            .collect::<Vec<_>>()
            .join(","),
    );

    for row in &result.rows {
        let fields: Vec<String> = result
            .column_names()
            .map(|name| row.get(name).map(value_to_string).unwrap_or_default())
            .map(|s| csv_escape(&s))
            .collect();
        lines.push(fields.join(","));
    }

    lines.join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use logpack_common::types::QueryColumn;
    use serde_json::{json, Map};

    fn result(columns: &[&str], rows: Vec<Value>) -> QueryResult {
        QueryResult {
            columns: columns
                .iter()
                .map(|name| QueryColumn {
                    name: name.to_string(),
                    data_type: "Utf8".to_string(),
                })
                .collect(),
            rows: rows
                .into_iter()
                .map(|row| match row {
                    Value::Object(map) => map,
                    _ => Map::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line\nbreak"), "\"line\nbreak\"");
        assert_eq!(csv_escape(""), "");
    }

    #[test]
    fn test_to_csv_layout() {
        let csv = to_csv(&result(
            &["src_ip", "denied_count", "note"],
            vec![
                json!({"src_ip": "10.0.0.1", "denied_count": 2, "note": null}),
                json!({"src_ip": "10.0.0.2", "denied_count": 1}),
            ],
        ));
        assert_eq!(csv, "src_ip,denied_count,note\n10.0.0.1,2,\n10.0.0.2,1,");
    }

    #[test]
    fn test_to_csv_empty_result_is_header_only() {
        assert_eq!(to_csv(&result(&["a", "b"], Vec::new())), "a,b");
    }

    #[test]
    fn test_nested_values_are_json() {
        let csv = to_csv(&result(&["u"], vec![json!({"u": {"userName": "alice"}})]));
        assert_eq!(csv, "u\n\"{\"\"userName\"\":\"\"alice\"\"}\"");
    }

    #[test]
    fn test_tricky_field_round_trips_through_csv_reader() {
        let tricky = "a,\"quoted\"\nnext line";
        let csv = to_csv(&result(&["id", "v"], vec![json!({"id": 1, "v": tricky})]));

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(csv.as_bytes());
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][0], "1");
        assert_eq!(&records[0][1], tricky);
    }
}
