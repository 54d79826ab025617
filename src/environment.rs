//! # Test Environment
//!
//! Process flags that decide which checks may touch GPUs, remote stores or
//! internal infrastructure. They are read once into a [`TestEnvironment`]
//! and the value is passed explicitly to whatever needs it.

use crate::constants::{env_vars, DEFAULT_REMOTE_STORE_ROOT};
use std::path::PathBuf;

/// Resolved execution flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEnvironment {
    /// Tests that need a person watching (GPU, network data) may run
    pub interactive_testing: bool,
    /// Running inside a sandboxed remote-execution worker
    pub inside_restricted_worker: bool,
    /// Running inside the internal test infrastructure
    pub privileged_test_context: bool,
    /// Local mount point of the remote store
    pub remote_store_root: PathBuf,
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self {
            interactive_testing: false,
            inside_restricted_worker: false,
            privileged_test_context: false,
            remote_store_root: PathBuf::from(DEFAULT_REMOTE_STORE_ROOT),
        }
    }
}

impl TestEnvironment {
    /// Read the flags from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the flags through an arbitrary lookup
    ///
    /// Interactive testing is enabled only by the exact value `1`. The two
    /// context flags count as set for any non-empty value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_set = |name: &str| lookup(name).is_some_and(|value| !value.is_empty());

        Self {
            interactive_testing: lookup(env_vars::INTERACTIVE_TESTING).as_deref() == Some("1"),
            inside_restricted_worker: is_set(env_vars::INSIDE_RESTRICTED_WORKER),
            privileged_test_context: is_set(env_vars::PRIVILEGED_TEST_CONTEXT),
            remote_store_root: lookup(env_vars::REMOTE_STORE_ROOT)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REMOTE_STORE_ROOT)),
        }
    }

    pub fn with_interactive_testing(mut self, enabled: bool) -> Self {
        self.interactive_testing = enabled;
        self
    }

    pub fn with_restricted_worker(mut self, inside: bool) -> Self {
        self.inside_restricted_worker = inside;
        self
    }

    pub fn with_privileged_test_context(mut self, privileged: bool) -> Self {
        self.privileged_test_context = privileged;
        self
    }

    pub fn with_remote_store_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.remote_store_root = root.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_no_flags_set() {
        let env = TestEnvironment::from_lookup(lookup_from(&[]));
        assert_eq!(env, TestEnvironment::default());
    }

    #[test]
    fn test_interactive_testing_requires_exactly_one() {
        for (value, expected) in [("1", true), ("0", false), ("true", false), ("", false)] {
            let env =
                TestEnvironment::from_lookup(lookup_from(&[(env_vars::INTERACTIVE_TESTING, value)]));
            assert_eq!(env.interactive_testing, expected, "value {value:?}");
        }
    }

    #[test]
    fn test_context_flags_accept_any_non_empty_value() {
        let env = TestEnvironment::from_lookup(lookup_from(&[
            (env_vars::INSIDE_RESTRICTED_WORKER, "0"),
            (env_vars::PRIVILEGED_TEST_CONTEXT, "yes"),
        ]));
        assert!(env.inside_restricted_worker);
        assert!(env.privileged_test_context);

        let env = TestEnvironment::from_lookup(lookup_from(&[
            (env_vars::INSIDE_RESTRICTED_WORKER, ""),
            (env_vars::PRIVILEGED_TEST_CONTEXT, ""),
        ]));
        assert!(!env.inside_restricted_worker);
        assert!(!env.privileged_test_context);
    }

    #[test]
    fn test_remote_store_root_override() {
        let env = TestEnvironment::from_lookup(lookup_from(&[(
            env_vars::REMOTE_STORE_ROOT,
            "/data/remote",
        )]));
        assert_eq!(env.remote_store_root, PathBuf::from("/data/remote"));
    }
}
