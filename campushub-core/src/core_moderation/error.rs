//! Error types for the moderation layer

use thiserror::Error;

/// Classifier call failures.
///
/// These never surface to publish callers: the gate converts every failure
/// into a fail-open decision. They exist so the trait seam can report what
/// went wrong for logging.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The remote endpoint could not be reached or errored
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}
