//! Pack manifest (`manifest.json`)
//!
//! Every pack carries a manifest describing itself and its log files. Only its
//! presence and JSON well-formedness are required; all fields are optional so
//! that older or hand-built packs still load.

use crate::archive::ArchiveEntry;
use crate::error::{EngineError, Result};
use crate::presets::PresetQuery;
use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE: &str = "manifest.json";

/// One log file listed in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    /// Path inside the archive, e.g. `logs/vpc/2024-09-01.csv`
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_hint: Option<String>,
    /// IANA zone name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Compressed size of the pack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
    /// Queries bundled with the pack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries: Option<Vec<PresetQuery>>,
}

impl PackManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| EngineError::InvalidManifest(e.to_string()))
    }
}

/// Whether `name` is the manifest, either at the top level or one directory deep
fn is_manifest_path(name: &str) -> bool {
    match name.strip_suffix(MANIFEST_FILE) {
        Some("") => true,
        Some(dir) => dir
            .strip_suffix('/')
            .is_some_and(|dir| !dir.is_empty() && !dir.contains('/')),
        None => false,
    }
}

/// Locate and parse the manifest among the archive entries
pub fn find_manifest(entries: &[ArchiveEntry]) -> Result<PackManifest> {
    let entry = entries
        .iter()
        .find(|e| is_manifest_path(&e.name))
        .ok_or(EngineError::MissingManifest)?;
    PackManifest::parse(&entry.payload)
}
