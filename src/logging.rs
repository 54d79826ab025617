//! # Structured Logging Module
//!
//! Environment-aware structured logging for training runs, plus
//! [`ScopedLogging`] for callers that need to quiet particular log targets
//! for a bounded stretch of code. The global filter sits behind a reload
//! layer, so a scope changes only the targets it names.

use crate::constants::env_vars;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Filter of the global subscriber, set only when this crate installed it
static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Development and test runs get human readable console output; production
/// runs emit JSON lines. Safe to call more than once.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json_output = environment == "production";

        let (filter_layer, filter_handle) = reload::Layer::new(build_filter(&log_level));

        let console_layer = (!json_output).then(|| {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true)
                .with_writer(std::io::stderr)
        });
        let json_layer = json_output.then(|| {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .with_writer(std::io::stderr)
                .json()
        });

        let subscriber = tracing_subscriber::registry()
            .with(filter_layer)
            .with(console_layer)
            .with(json_layer);

        // A global subscriber may already exist (e.g. installed by a test harness)
        if subscriber.try_init().is_ok() {
            let _ = FILTER_HANDLE.set(filter_handle);
        } else {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            log_level = %log_level,
            json_output = json_output,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var(env_vars::TRAINER_ENV)
        .unwrap_or_else(|_| "development".to_string())
        .to_lowercase()
}

/// Get log filter, honouring an explicit filter override
fn get_log_level(environment: &str) -> String {
    if let Ok(filter) = std::env::var(env_vars::LOG_FILTER) {
        if !filter.trim().is_empty() {
            return filter;
        }
    }
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn build_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Target silencing that lasts as long as the value lives
///
/// Silencing a target appends `target=off` to the filter of the subscriber
/// installed by [`init_structured_logging`]; every other target keeps its
/// level and the output layers stay as they are. Dropping the value puts
/// the previous filter back. Without that subscriber the targets are only
/// recorded, since nothing else would be listening.
///
/// ```rust
/// use implicitron_trainer::logging::ScopedLogging;
///
/// let mut logging = ScopedLogging::new();
/// logging.silence("implicitron_trainer::path_manager");
/// assert!(logging.is_silenced("implicitron_trainer::path_manager::remote"));
/// ```
#[derive(Debug, Default)]
pub struct ScopedLogging {
    silenced: Vec<String>,
    /// Global filter directives in effect before the first `silence`
    previous: Option<String>,
}

impl ScopedLogging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn off every event whose target is `target` or nested below it
    pub fn silence(&mut self, target: &str) {
        if self.silenced.iter().any(|t| t == target) {
            return;
        }
        self.silenced.push(target.to_string());

        let Some(handle) = FILTER_HANDLE.get() else {
            return;
        };
        if self.previous.is_none() {
            self.previous = handle.with_current(|filter| filter.to_string()).ok();
        }
        if let Err(error) = handle.reload(build_filter(&self.filter_directives())) {
            tracing::warn!(target = %target, error = %error, "Failed to silence log target");
        }
    }

    pub fn is_silenced(&self, target: &str) -> bool {
        self.silenced.iter().any(|silenced| {
            target == silenced
                || target
                    .strip_prefix(silenced.as_str())
                    .is_some_and(|rest| rest.starts_with("::"))
        })
    }

    pub fn silenced_targets(&self) -> &[String] {
        &self.silenced
    }

    /// Directives applied while the scope lives: the previous global filter
    /// followed by one `target=off` per silenced target
    pub fn filter_directives(&self) -> String {
        self.previous
            .iter()
            .filter(|previous| !previous.is_empty())
            .cloned()
            .chain(self.silenced.iter().map(|target| format!("{target}=off")))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Drop for ScopedLogging {
    fn drop(&mut self) {
        if let (Some(handle), Some(previous)) = (FILTER_HANDLE.get(), self.previous.take()) {
            let _ = handle.reload(build_filter(&previous));
        }
    }
}
