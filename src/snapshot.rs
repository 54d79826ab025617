//! Golden-file comparison for rendered configuration.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Compare against the stored fixture
    Verify,
    /// Overwrite the stored fixture with the new text
    Record,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot {path} differs from the rendered output:\n{diff}")]
    Mismatch { path: PathBuf, diff: String },

    #[error("Snapshot I/O error on {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

/// Compare `actual` with the fixture at `path`, or rewrite the fixture in
/// [`SnapshotMode::Record`]
pub fn verify_or_record(path: &Path, actual: &str, mode: SnapshotMode) -> Result<(), SnapshotError> {
    let io_error = |error: std::io::Error| SnapshotError::Io {
        path: path.to_path_buf(),
        error,
    };

    match mode {
        SnapshotMode::Record => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(io_error)?;
            }
            std::fs::write(path, actual).map_err(io_error)?;
            info!(path = %path.display(), "Recorded snapshot");
            Ok(())
        }
        SnapshotMode::Verify => {
            let expected = std::fs::read_to_string(path).map_err(io_error)?;
            if expected == actual {
                Ok(())
            } else {
                Err(SnapshotError::Mismatch {
                    path: path.to_path_buf(),
                    diff: line_diff(&expected, actual),
                })
            }
        }
    }
}

/// Changed region as `-expected` then `+actual` lines with 1-based line
/// numbers; lines shared at the start and end are left out
pub fn line_diff(expected: &str, actual: &str) -> String {
    let expected: Vec<&str> = expected.lines().collect();
    let actual: Vec<&str> = actual.lines().collect();

    let prefix = expected
        .iter()
        .zip(&actual)
        .take_while(|(old, new)| old == new)
        .count();
    let suffix = expected[prefix..]
        .iter()
        .rev()
        .zip(actual[prefix..].iter().rev())
        .take_while(|(old, new)| old == new)
        .count();

    let mut diff = String::new();
    for (offset, old) in expected[prefix..expected.len() - suffix].iter().enumerate() {
        diff.push_str(&format!("{:>4} -{old}\n", prefix + offset + 1));
    }
    for (offset, new) in actual[prefix..actual.len() - suffix].iter().enumerate() {
        diff.push_str(&format!("{:>4} +{new}\n", prefix + offset + 1));
    }
    if diff.is_empty() {
        // only trailing newlines differ
        diff.push_str("(line endings differ)\n");
    }
    diff
}
