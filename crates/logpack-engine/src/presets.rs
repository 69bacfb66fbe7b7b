//! Built-in starter queries
//!
//! Query packs that ship with LogPack for the two materialized tables. Packs
//! can also embed their own queries in `manifest.json`, using the same shape.

use logpack_common::types::QueryColumn;
use serde::{Deserialize, Serialize};

/// Pack id the starter queries were written against
pub const STARTER_PACK_ID: &str = "starter-vpc-cloudtrail";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    Overview,
    Network,
    Iam,
    Errors,
    Anomalies,
    Forensics,
}

impl std::fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QueryCategory::Overview => "overview",
            QueryCategory::Network => "network",
            QueryCategory::Iam => "iam",
            QueryCategory::Errors => "errors",
            QueryCategory::Anomalies => "anomalies",
            QueryCategory::Forensics => "forensics",
        };
        f.write_str(name)
    }
}

/// Columns a query is expected to return
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputShape {
    pub columns: Vec<QueryColumn>,
}

/// A named, reusable query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetQuery {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<QueryCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputShape>,
}

/// A themed group of queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPack {
    pub id: String,
    /// Log pack the queries apply to, or `any`
    pub pack_id: String,
    pub title: String,
    pub category: QueryCategory,
    pub queries: Vec<PresetQuery>,
}

fn column(name: &str, data_type: &str) -> QueryColumn {
    QueryColumn {
        name: name.to_string(),
        data_type: data_type.to_string(),
    }
}

fn preset(
    id: &str,
    title: &str,
    description: &str,
    category: QueryCategory,
    tags: &[&str],
    sql: &str,
    columns: &[(&str, &str)],
) -> PresetQuery {
    PresetQuery {
        id: id.to_string(),
        title: title.to_string(),
        description: Some(description.to_string()),
        sql: sql.trim().to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        category: Some(category),
        output: Some(OutputShape {
            columns: columns.iter().map(|(n, t)| column(n, t)).collect(),
        }),
    }
}

// ============================================================================
// VPC Flow
// ============================================================================

pub fn vpc_flow_basics() -> QueryPack {
    QueryPack {
        id: "vpc-flow-basics".to_string(),
        pack_id: STARTER_PACK_ID.to_string(),
        title: "VPC Flow Basics".to_string(),
        category: QueryCategory::Network,
        queries: vec![
            preset(
                "top-talkers",
                "Top Talkers by Bytes",
                "Identify source/destination pairs with highest total bytes.",
                QueryCategory::Network,
                &["vpc", "network", "topn"],
                r#"
SELECT
  srcaddr AS src_ip,
  dstaddr AS dst_ip,
  SUM(bytes) AS total_bytes,
  SUM(packets) AS total_packets
FROM vpc_flow_logs
GROUP BY 1, 2
ORDER BY total_bytes DESC
LIMIT 20;
"#,
                &[
                    ("src_ip", "ip"),
                    ("dst_ip", "ip"),
                    ("total_bytes", "integer"),
                    ("total_packets", "integer"),
                ],
            ),
            preset(
                "denied-connections",
                "Denied Connections by Source",
                "Flow log entries with action = 'REJECT' grouped by src.",
                QueryCategory::Network,
                &["vpc", "reject", "security"],
                r#"
SELECT srcaddr AS src_ip, COUNT(*) AS denied_count
FROM vpc_flow_logs
WHERE action = 'REJECT'
GROUP BY 1
ORDER BY denied_count DESC
LIMIT 50;
"#,
                &[("src_ip", "ip"), ("denied_count", "integer")],
            ),
            preset(
                "port-protocol-dist",
                "Port & Protocol Distribution",
                "Top destination ports and L4 protocols by volume.",
                QueryCategory::Overview,
                &["vpc", "ports"],
                r#"
SELECT protocol, dstport, COUNT(*) AS c
FROM vpc_flow_logs
GROUP BY 1, 2
ORDER BY c DESC
LIMIT 50;
"#,
                &[("protocol", "integer"), ("dstport", "integer"), ("c", "integer")],
            ),
        ],
    }
}

// ============================================================================
// CloudTrail
// ============================================================================

pub fn cloudtrail_basics() -> QueryPack {
    QueryPack {
        id: "cloudtrail-basics".to_string(),
        pack_id: STARTER_PACK_ID.to_string(),
        title: "CloudTrail Basics".to_string(),
        category: QueryCategory::Iam,
        queries: vec![
            preset(
                "error-events",
                "Error Events by Name",
                "Top events with errors observed in CloudTrail.",
                QueryCategory::Errors,
                &["cloudtrail", "errors"],
                r#"
SELECT eventName, COUNT(*) AS error_count
FROM cloudtrail_events
WHERE errorCode IS NOT NULL
GROUP BY 1
ORDER BY error_count DESC
LIMIT 20;
"#,
                &[("eventName", "string"), ("error_count", "integer")],
            ),
            preset(
                "iam-sensitive-actions",
                "IAM-Sensitive Actions",
                "Commonly sensitive IAM or policy changes.",
                QueryCategory::Iam,
                &["iam", "security"],
                r#"
SELECT eventTime AS timestamp, userIdentity.userName AS user, eventName, awsRegion
FROM cloudtrail_events
WHERE eventName IN (
  'CreateUser','AttachRolePolicy','PutBucketPolicy','PutUserPolicy','CreateAccessKey','UpdateAssumeRolePolicy'
)
ORDER BY timestamp DESC
LIMIT 100;
"#,
                &[
                    ("timestamp", "timestamp"),
                    ("user", "string"),
                    ("eventName", "string"),
                    ("awsRegion", "string"),
                ],
            ),
            preset(
                "rare-events",
                "Rare Events (Top Outliers)",
                "Events that appear infrequently by daily count.",
                QueryCategory::Anomalies,
                &["anomaly"],
                r#"
WITH counts AS (
  SELECT date_trunc('day', eventTime) AS day, eventName, COUNT(*) AS c
  FROM cloudtrail_events
  GROUP BY 1,2
)
SELECT eventName, MIN(c) AS min_daily, MAX(c) AS max_daily, AVG(c) AS avg_daily
FROM counts
GROUP BY 1
ORDER BY min_daily ASC, avg_daily ASC
LIMIT 50;
"#,
                &[
                    ("eventName", "string"),
                    ("min_daily", "integer"),
                    ("max_daily", "integer"),
                    ("avg_daily", "number"),
                ],
            ),
        ],
    }
}

/// All built-in query packs
pub fn starter_packs() -> Vec<QueryPack> {
    vec![vpc_flow_basics(), cloudtrail_basics()]
}

/// Look up a built-in query by id
pub fn find_query(id: &str) -> Option<PresetQuery> {
    starter_packs()
        .into_iter()
        .flat_map(|pack| pack.queries)
        .find(|query| query.id == id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_starter_packs_have_unique_query_ids() {
        let packs = starter_packs();
        assert_eq!(packs.len(), 2);
        let ids: Vec<_> = packs.iter().flat_map(|p| p.queries.iter().map(|q| q.id.as_str())).collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), 6);
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_find_query() {
        let query = find_query("denied-connections").unwrap();
        assert!(query.sql.starts_with("SELECT srcaddr AS src_ip"));
        assert!(query.sql.contains("vpc_flow_logs"));
        assert_eq!(query.category, Some(QueryCategory::Network));
        assert!(find_query("no-such-query").is_none());
    }

    #[test]
    fn test_queries_target_known_tables() {
        for pack in starter_packs() {
            for query in pack.queries {
                assert!(
                    query.sql.contains("vpc_flow_logs") || query.sql.contains("cloudtrail_events"),
                    "{} targets an unknown table",
                    query.id
                );
                assert!(!query.output.unwrap().columns.is_empty());
            }
        }
    }

    #[test]
    fn test_query_pack_wire_shape() {
        let value = serde_json::to_value(vpc_flow_basics()).unwrap();
        assert_eq!(value["packId"], STARTER_PACK_ID);
        assert_eq!(value["category"], "network");
        assert_eq!(value["queries"][0]["output"]["columns"][0]["type"], "ip");
    }
}
