//! Export the snapshot to a JSON file

use crate::document::Snapshot;
use crate::error::{Result, SnapshotError};
use serde::Serialize;
use std::path::Path;

/// Serialize with four-space indentation
pub fn to_json(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    snapshot.serialize(&mut ser)?;
    Ok(buf)
}

/// Write the snapshot to `path`.
///
/// The document is fully serialized before the file is touched, so a
/// serialization failure never leaves a file behind.
pub fn write_snapshot(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let json = to_json(snapshot)?;
    std::fs::write(path, json).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })
}
