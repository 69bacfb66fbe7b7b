//! Gzip decompression for packs and their members
//!
//! Packs arrive as a gzip-wrapped tar, and individual members under `logs/`
//! may themselves be gzip-compressed. Both are inflated fully in memory.
//!
//! # Examples
//!
//! ```rust
//! use logpack_engine::decompression::{decompress_gzip, strip_gz_suffix};
//!
//! assert_eq!(strip_gz_suffix("logs/ct/events.json.gz"), Some("logs/ct/events.json"));
//! assert!(decompress_gzip(b"not gzip").is_err());
//! ```

use crate::error::{EngineError, Result};
use flate2::read::MultiGzDecoder;
use std::io::Read;
use tracing::debug;

/// Gzip magic bytes
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Whether `data` starts with the gzip magic bytes
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

/// Decompress gzip-compressed data
///
/// Concatenated gzip members are decoded as one stream.
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    if !is_gzip(data) {
        return Err(EngineError::Decompression("input is not gzip data".to_string()));
    }

    let mut decoder = MultiGzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| EngineError::Decompression(e.to_string()))?;
    debug!("Decompressed {} -> {} bytes", data.len(), decompressed.len());
    Ok(decompressed)
}

/// Name of a member once its gzip suffix is removed, or `None` if it has none
pub fn strip_gz_suffix(name: &str) -> Option<&str> {
    let cut = name.len().checked_sub(3)?;
    if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".gz") {
        Some(&name[..cut])
    } else {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decompress_gzip() {
        let original = b"srcaddr,dstaddr\n10.0.0.1,10.0.0.2\n";
        let compressed = gzip(original);
        assert!(is_gzip(&compressed));
        assert_eq!(decompress_gzip(&compressed).unwrap(), original);
    }

    #[test]
    fn test_decompress_concatenated_members() {
        let mut data = gzip(b"first,");
        data.extend(gzip(b"second"));
        assert_eq!(decompress_gzip(&data).unwrap(), b"first,second");
    }

    #[test]
    fn test_decompress_rejects_plain_bytes() {
        assert!(matches!(
            decompress_gzip(b"{\"eventName\":\"x\"}"),
            Err(EngineError::Decompression(_))
        ));
        assert!(decompress_gzip(&[]).is_err());
    }

    #[test]
    fn test_decompress_rejects_truncated_stream() {
        let compressed = gzip(&[7u8; 4096]);
        let truncated = &compressed[..compressed.len() / 2];
        assert!(decompress_gzip(truncated).is_err());
    }

    #[test]
    fn test_strip_gz_suffix() {
        assert_eq!(strip_gz_suffix("logs/a.json.gz"), Some("logs/a.json"));
        assert_eq!(strip_gz_suffix("logs/A.CSV.GZ"), Some("logs/A.CSV"));
        assert_eq!(strip_gz_suffix("logs/a.json"), None);
        assert_eq!(strip_gz_suffix("gz"), None);
        assert_eq!(strip_gz_suffix(".gz"), Some(""));
    }
}
