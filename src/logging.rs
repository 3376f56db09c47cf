/// Structured logging for the SWOT input service
///
/// Log lines are emitted through `tracing`; this module sets up the
/// subscriber and adds the service's conventions on top: every fetch
/// failure is tagged with its data source and feature identifier and
/// classified as expected / unexpected / unknown, which decides its level.

use std::fmt;

use tracing_subscriber::EnvFilter;

use crate::model::InputError;

// ---------------------------------------------------------------------------
// Initialisation
// ---------------------------------------------------------------------------

/// Crate targets that receive log output by default.
const CRATE_TARGETS: &[&str] = &["swot_input"];

/// Initialize tracing based on CLI verbosity level.
///
/// Mapping:
/// - 0 (none) -> warn
/// - 1 (-v)   -> info
/// - 2 (-vv)  -> debug
/// - 3+ (-vvv)-> trace
///
/// `RUST_LOG` env var overrides the CLI flag if set.
pub fn init(verbosity: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn default_filter(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    CRATE_TARGETS
        .iter()
        .map(|t| format!("{t}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Hydrocron,
    Local,
    Replay,
    Nwis,
    Store,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Hydrocron => write!(f, "HYDROCRON"),
            DataSource::Local => write!(f, "LOCAL"),
            DataSource::Replay => write!(f, "REPLAY"),
            DataSource::Nwis => write!(f, "NWIS"),
            DataSource::Store => write!(f, "STORE"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the feature simply has no observations in range
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a fetch failure by its error kind.
pub fn classify_failure(err: &InputError) -> FailureType {
    match err {
        // SWOT does not see every feature on every pass; nodes in
        // particular are routinely absent.
        InputError::NoDataAvailable(_) => FailureType::Expected,
        InputError::HttpError(_)
        | InputError::Request(_)
        | InputError::RetriesExhausted { .. }
        | InputError::ParseError(_)
        | InputError::Io { .. }
        | InputError::Config(_) => FailureType::Unexpected,
        _ => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a data source failure with automatic classification
pub fn log_fetch_failure(source: DataSource, feature_id: &str, operation: &str, err: &InputError) {
    let failure_type = classify_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => tracing::debug!(source = %source, feature_id, "{message}"),
        FailureType::Unexpected => tracing::error!(source = %source, feature_id, "{message}"),
        FailureType::Unknown => tracing::warn!(source = %source, feature_id, "{message}"),
    }
}

// ---------------------------------------------------------------------------
// Batch Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a batch of fetches or writes
pub fn log_batch_summary(source: DataSource, what: &str, total: usize, successful: usize, failed: usize) {
    let message = format!("{} complete: {}/{} successful, {} failed", what, successful, total, failed);

    if failed == 0 {
        tracing::info!(source = %source, "{message}");
    } else if successful == 0 {
        tracing::error!(source = %source, "{message}");
    } else {
        tracing::warn!(source = %source, "{message}");
    }
}
