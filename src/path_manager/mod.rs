//! # Path Manager
//!
//! Uniform access to local files and remote stores. Paths are plain strings:
//! anything carrying a `scheme://` prefix is routed to the handler that
//! registered that prefix, everything else goes to the local filesystem.
//!
//! ```rust
//! use implicitron_trainer::path_manager::{PathManager, RemoteStoreHandler};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut path_manager = PathManager::new();
//! assert!(!path_manager.has_handler_for("manifold://co3d/tree"));
//!
//! path_manager.register_handler(RemoteStoreHandler::new("/mnt/manifold"))?;
//! assert!(path_manager.has_handler_for("manifold://co3d/tree"));
//! # Ok(())
//! # }
//! ```

pub mod native;
pub mod remote;

use crate::constants::REMOTE_STORE_SCHEME;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use native::NativePathHandler;
pub use remote::RemoteStoreHandler;

/// Path resolution errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("No path handler registered for '{path}' (scheme '{scheme}')")]
    NoHandler { path: String, scheme: String },

    #[error("A path handler for prefix '{prefix}' is already registered")]
    DuplicatePrefix { prefix: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("I/O error on '{path}': {error}")]
    Io { path: String, error: String },
}

impl PathError {
    pub fn invalid_path<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io<P: Into<String>, E: std::fmt::Display>(path: P, error: E) -> Self {
        Self::Io {
            path: path.into(),
            error: error.to_string(),
        }
    }
}

pub type PathResult<T> = Result<T, PathError>;

/// Storage backend reachable through one or more URI prefixes
pub trait PathHandler: std::fmt::Debug + Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Prefixes routed to this handler, e.g. `manifold://`
    fn supported_prefixes(&self) -> Vec<String>;

    /// Local filesystem location backing `path`
    fn get_local_path(&self, path: &str) -> PathResult<PathBuf>;

    fn exists(&self, path: &str) -> PathResult<bool> {
        Ok(self.get_local_path(path)?.exists())
    }

    fn read_to_string(&self, path: &str) -> PathResult<String> {
        let local = self.get_local_path(path)?;
        std::fs::read_to_string(&local).map_err(|e| PathError::io(path, e))
    }

    /// Write `contents`, creating missing parent directories
    fn write_string(&self, path: &str, contents: &str) -> PathResult<()> {
        let local = self.get_local_path(path)?;
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PathError::io(path, e))?;
        }
        std::fs::write(&local, contents).map_err(|e| PathError::io(path, e))
    }

    fn mkdirs(&self, path: &str) -> PathResult<()> {
        let local = self.get_local_path(path)?;
        std::fs::create_dir_all(&local).map_err(|e| PathError::io(path, e))
    }

    /// Entry names directly below `path`, sorted
    fn ls(&self, path: &str) -> PathResult<Vec<String>> {
        let local = self.get_local_path(path)?;
        let mut names = std::fs::read_dir(&local)
            .map_err(|e| PathError::io(path, e))?
            .map(|entry| {
                entry
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .map_err(|e| PathError::io(path, e))
            })
            .collect::<PathResult<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    fn remove_file(&self, path: &str) -> PathResult<()> {
        let local = self.get_local_path(path)?;
        std::fs::remove_file(&local).map_err(|e| PathError::io(path, e))
    }
}

/// Dispatches paths to registered handlers by longest matching prefix
#[derive(Debug, Clone, Default)]
pub struct PathManager {
    handlers: Vec<(String, Arc<dyn PathHandler>)>,
    native: NativePathHandler,
}

impl PathManager {
    /// Manager that only knows the local filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager able to read `dataset_root`
    ///
    /// Local roots get the local filesystem only. A remote store URI adds a
    /// [`RemoteStoreHandler`] mounted at `remote_store_root`.
    pub fn for_dataset_root(dataset_root: &str, remote_store_root: &Path) -> PathResult<Self> {
        let mut path_manager = Self::new();
        if dataset_root.starts_with(REMOTE_STORE_SCHEME) {
            let handler = RemoteStoreHandler::new(remote_store_root);
            debug!(
                dataset_root = %dataset_root,
                mount_root = %handler.mount_root().display(),
                "Dataset root is on the remote store"
            );
            path_manager.register_handler(handler)?;
        }
        Ok(path_manager)
    }

    /// Register a handler for all of its prefixes
    ///
    /// Fails without registering anything if one of the prefixes is taken.
    pub fn register_handler<H: PathHandler + 'static>(&mut self, handler: H) -> PathResult<()> {
        let prefixes = handler.supported_prefixes();
        for prefix in &prefixes {
            if self.handlers.iter().any(|(existing, _)| existing == prefix)
                || self.native.supported_prefixes().contains(prefix)
            {
                return Err(PathError::DuplicatePrefix {
                    prefix: prefix.clone(),
                });
            }
        }

        debug!(handler = handler.name(), prefixes = ?prefixes, "Registering path handler");

        let handler: Arc<dyn PathHandler> = Arc::new(handler);
        for prefix in prefixes {
            self.handlers.push((prefix, Arc::clone(&handler)));
        }
        // longest prefix wins
        self.handlers
            .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Ok(())
    }

    /// Prefixes with a registered handler, longest first
    pub fn registered_prefixes(&self) -> Vec<&str> {
        self.handlers.iter().map(|(prefix, _)| prefix.as_str()).collect()
    }

    pub fn has_handler_for(&self, path: &str) -> bool {
        self.handler_for(path).is_ok()
    }

    fn handler_for(&self, path: &str) -> PathResult<&dyn PathHandler> {
        if let Some((_, handler)) = self
            .handlers
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
        {
            return Ok(handler.as_ref());
        }

        match uri_scheme(path) {
            Some(scheme) if !self.native.handles_scheme(scheme) => Err(PathError::NoHandler {
                path: path.to_string(),
                scheme: scheme.to_string(),
            }),
            _ => Ok(&self.native),
        }
    }

    pub fn get_local_path(&self, path: &str) -> PathResult<PathBuf> {
        self.handler_for(path)?.get_local_path(path)
    }

    pub fn exists(&self, path: &str) -> PathResult<bool> {
        self.handler_for(path)?.exists(path)
    }

    pub fn read_to_string(&self, path: &str) -> PathResult<String> {
        self.handler_for(path)?.read_to_string(path)
    }

    pub fn write_string(&self, path: &str, contents: &str) -> PathResult<()> {
        self.handler_for(path)?.write_string(path, contents)
    }

    pub fn mkdirs(&self, path: &str) -> PathResult<()> {
        self.handler_for(path)?.mkdirs(path)
    }

    pub fn ls(&self, path: &str) -> PathResult<Vec<String>> {
        self.handler_for(path)?.ls(path)
    }

    pub fn remove_file(&self, path: &str) -> PathResult<()> {
        self.handler_for(path)?.remove_file(path)
    }
}

/// Scheme part of `scheme://rest`, if any
pub fn uri_scheme(path: &str) -> Option<&str> {
    let (scheme, _) = path.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

/// Join path components with `/`, keeping any URI prefix on `base` intact
pub fn join_path(base: &str, parts: &[&str]) -> String {
    let mut joined = base.trim_end_matches('/').to_string();
    for part in parts {
        let part = part.trim_matches('/');
        if part.is_empty() {
            continue;
        }
        if !joined.is_empty() {
            joined.push('/');
        }
        joined.push_str(part);
    }
    if joined.is_empty() && base.starts_with('/') {
        joined.push('/');
    }
    joined
}
