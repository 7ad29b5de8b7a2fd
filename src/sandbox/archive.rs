//! In-memory tar streams for code injection and artifact retrieval.
//!
//! Source code travels into the container as a single-file uncompressed
//! tar archive written to the container filesystem before the entry
//! process starts. Generated images travel back the same way: the Docker
//! archive endpoint returns the artifact directory as a tar stream which
//! is scanned here for matching image entries. The format is
//! language-neutral, nothing in it is specific to Python.

use std::io::Read;

use super::error::SandboxError;

/// Packs `source` as a single-file uncompressed tar archive under
/// `entry_name`. The entry is sized to the exact byte length of the
/// encoded source, mode 0644.
pub fn pack_source(source: &str, entry_name: &str) -> Result<Vec<u8>, SandboxError> {
    let bytes = source.as_bytes();
    let mut builder = tar::Builder::new(Vec::new());

    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    builder
        .append_data(&mut header, entry_name, bytes)
        .map_err(|e| SandboxError::Runtime(format!("packing source archive: {e}")))?;
    builder
        .into_inner()
        .map_err(|e| SandboxError::Runtime(format!("finishing source archive: {e}")))
}

/// Scans a tar stream for regular files whose name ends with the given
/// image extension, returning `(file_name, bytes)` pairs in archive entry
/// order. Non-matching entries (the injected script, directories, other
/// file types) are skipped.
pub fn scan_images(
    archive: &[u8],
    extension: &str,
) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let suffix = format!(".{extension}");
    let mut images = Vec::new();

    let mut tar = tar::Archive::new(archive);
    for entry in tar.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = match entry.path() {
            Ok(path) => match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            },
            Err(_) => continue,
        };
        if !name.ends_with(&suffix) {
            continue;
        }

        // Header sizes come from inside the container, so no pre-allocation
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        images.push((name, bytes));
    }

    Ok(images)
}
