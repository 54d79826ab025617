//! Remote store handler.
//!
//! `manifold://bucket/key` URIs are served from a local mount of the remote
//! store, laid out as `<mount_root>/bucket/key`.

use super::{PathError, PathHandler, PathResult};
use crate::constants::REMOTE_STORE_SCHEME;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RemoteStoreHandler {
    mount_root: PathBuf,
}

impl RemoteStoreHandler {
    pub fn new<P: Into<PathBuf>>(mount_root: P) -> Self {
        Self {
            mount_root: mount_root.into(),
        }
    }

    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    /// Split `manifold://bucket/key` into bucket and key
    fn parse<'a>(&self, path: &'a str) -> PathResult<(&'a str, &'a str)> {
        let rest = path.strip_prefix(REMOTE_STORE_SCHEME).ok_or_else(|| {
            PathError::invalid_path(path, format!("expected a {REMOTE_STORE_SCHEME} URI"))
        })?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(PathError::invalid_path(path, "missing bucket name"));
        }

        let escapes = Path::new(key)
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir));
        if escapes {
            return Err(PathError::invalid_path(
                path,
                "key must stay inside its bucket",
            ));
        }
        Ok((bucket, key))
    }
}

impl PathHandler for RemoteStoreHandler {
    fn name(&self) -> &'static str {
        "remote_store"
    }

    fn supported_prefixes(&self) -> Vec<String> {
        vec![REMOTE_STORE_SCHEME.to_string()]
    }

    fn get_local_path(&self, path: &str) -> PathResult<PathBuf> {
        let (bucket, key) = self.parse(path)?;
        let local = self.mount_root.join(bucket).join(key);
        debug!(uri = %path, local = %local.display(), "Resolved remote store path");
        Ok(local)
    }

    fn read_to_string(&self, path: &str) -> PathResult<String> {
        let local = self.get_local_path(path)?;
        let contents = std::fs::read_to_string(&local).map_err(|e| PathError::io(path, e))?;
        debug!(uri = %path, bytes = contents.len(), "Read from remote store");
        Ok(contents)
    }
}
