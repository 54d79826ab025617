//! Local filesystem handler.

use super::{PathHandler, PathResult};
use std::path::PathBuf;

const FILE_PREFIX: &str = "file://";

/// Serves plain paths and `file://` URIs from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePathHandler;

impl NativePathHandler {
    pub(crate) fn handles_scheme(&self, scheme: &str) -> bool {
        scheme == "file"
    }
}

impl PathHandler for NativePathHandler {
    fn name(&self) -> &'static str {
        "native"
    }

    fn supported_prefixes(&self) -> Vec<String> {
        vec![FILE_PREFIX.to_string()]
    }

    fn get_local_path(&self, path: &str) -> PathResult<PathBuf> {
        Ok(PathBuf::from(path.strip_prefix(FILE_PREFIX).unwrap_or(path)))
    }
}
