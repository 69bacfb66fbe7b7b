//! Sequential tar reader
//!
//! Reads the POSIX ustar / GNU subset produced by common packers from an
//! in-memory, already decompressed buffer. Headers are decoded permissively:
//! names are lossy UTF-8, sizes tolerate space and NUL padding, and header
//! checksums are not validated.
//!
//! A member whose declared size runs past the end of the buffer is clamped to
//! the bytes that remain.

use tracing::{debug, warn};

/// Tar block size
pub const BLOCK_SIZE: usize = 512;

const NAME_RANGE: std::ops::Range<usize> = 0..100;
const SIZE_RANGE: std::ops::Range<usize> = 124..136;
const TYPEFLAG_OFFSET: usize = 156;
const PREFIX_RANGE: std::ops::Range<usize> = 345..500;

/// One named file packed inside the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub payload: Vec<u8>,
}

/// Decode a NUL-terminated header field
fn read_cstr(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Parse an octal numeric field, ignoring anything that is not an octal digit
fn read_octal(field: &[u8]) -> u64 {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    field[..end]
        .iter()
        .filter(|b| (b'0'..=b'7').contains(*b))
        .fold(0u64, |acc, b| acc.saturating_mul(8).saturating_add(u64::from(b - b'0')))
}

/// Extract the `path` record of a pax extended header.
///
/// Records have the form `"<len> <key>=<value>\n"`.
fn pax_path(payload: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(payload);
    text.lines().find_map(|record| {
        let (_, kv) = record.split_once(' ')?;
        kv.strip_prefix("path=").map(str::to_string)
    })
}

/// Parse a tar stream into its file entries, in archive order.
pub fn parse_tar(data: &[u8]) -> Vec<ArchiveEntry> {
    let mut entries = Vec::new();
    let mut offset = 0usize;
    let mut next_name: Option<String> = None;

    while offset + BLOCK_SIZE <= data.len() {
        let header = &data[offset..offset + BLOCK_SIZE];
        if header.iter().all(|&b| b == 0) {
            break;
        }

        let name = read_cstr(&header[NAME_RANGE]);
        let prefix = read_cstr(&header[PREFIX_RANGE]);
        let declared = read_octal(&header[SIZE_RANGE]);
        let typeflag = header[TYPEFLAG_OFFSET];

        offset += BLOCK_SIZE;
        let available = data.len() - offset;
        let size = usize::try_from(declared).unwrap_or(usize::MAX).min(available);
        if (size as u64) < declared {
            warn!(
                entry = %name,
                declared,
                available,
                "Truncated tar member, clamping to available bytes"
            );
        }
        let payload = &data[offset..offset + size];

        match typeflag {
            // GNU long name for the following member
            b'L' => next_name = Some(read_cstr(payload)),
            b'x' => {
                if let Some(path) = pax_path(payload) {
                    next_name = Some(path);
                }
            },
            // global pax header, GNU long link target, directory
            b'g' | b'K' | b'5' => {
                next_name = None;
            },
            _ => {
                let full_name = match next_name.take() {
                    Some(long) => long,
                    None if prefix.is_empty() => name,
                    None => format!("{}/{}", prefix, name),
                };
                // `tar -C dir .` writes members as `./logs/...`
                let full_name = full_name.trim_start_matches("./").to_string();
                debug!(entry = %full_name, size, "Read tar member");
                entries.push(ArchiveEntry {
                    name: full_name,
                    payload: payload.to_vec(),
                });
            },
        }

        let padding = (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE;
        offset = offset.saturating_add(size + padding);
    }

    entries
}
