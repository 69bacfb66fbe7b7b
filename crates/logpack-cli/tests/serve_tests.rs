//! Stdio protocol tests for `logpack serve`

use assert_cmd::Command;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::io::Write;
use tempfile::TempDir;

fn write_pack(dir: &TempDir) -> String {
    let flows = "srcaddr,dstaddr,bytes,packets,action\n10.0.0.1,10.0.0.9,100,1,REJECT\n";
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in [("manifest.json", "{}"), ("logs/vpc/flows.csv", flows)] {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, data.as_bytes()).unwrap();
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&builder.into_inner().unwrap()).unwrap();

    let path = dir.path().join("pack.tar.gz");
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();
    path.display().to_string()
}

fn serve(input: String) -> Vec<Value> {
    let output = Command::cargo_bin("logpack")
        .unwrap()
        .arg("serve")
        .env("LOG_LEVEL", "error")
        .write_stdin(input)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_serve_ingest_and_query() {
    let dir = TempDir::new().unwrap();
    let pack = write_pack(&dir);

    let input = [
        json!({"type": "ping"}),
        json!({"type": "ingestPack", "path": pack}),
        json!({"type": "runQuery", "id": "q_1", "sql": "SELECT srcaddr FROM vpc_flow_logs"}),
        json!({"type": "dispose"}),
    ]
    .iter()
    .map(|m| m.to_string() + "\n")
    .collect::<String>();

    let replies = serve(input);
    assert_eq!(replies.first(), Some(&json!({"type": "pong"})));

    let stages: Vec<&str> = replies
        .iter()
        .filter(|m| m["type"] == "progress")
        .filter_map(|m| m["stage"].as_str())
        .collect();
    assert_eq!(stages.first(), Some(&"download"));
    assert_eq!(stages.last(), Some(&"ingest"));

    let ready = replies.iter().find(|m| m["type"] == "ready").unwrap();
    assert_eq!(ready["tables"], json!([{"name": "vpc_flow_logs", "rowCount": 1, "source": "vpc_flow"}]));

    let result = replies.last().unwrap();
    assert_eq!(result["type"], "queryResult");
    assert_eq!(result["id"], "q_1");
    assert_eq!(result["rows"], json!([{"srcaddr": "10.0.0.1"}]));
}

#[test]
fn test_serve_rejects_unknown_message() {
    let replies = serve("{\"type\":\"launchMissiles\"}\n".to_string());
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["type"], "error");
    assert!(replies[0]["message"].as_str().unwrap().contains("launchMissiles"));
}

#[test]
fn test_serve_missing_file_reports_error() {
    let replies = serve("{\"type\":\"ingestPack\",\"path\":\"/nonexistent/pack.tar.gz\"}\n".to_string());
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["type"], "error");
    assert!(replies[0].get("id").is_none());
}
