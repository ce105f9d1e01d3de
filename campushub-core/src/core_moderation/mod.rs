//! Content moderation.
//!
//! A thin classifier seam plus a gate that owns the advisory policy:
//! classification failures never block publishing, and flagged content
//! leaves exactly one immutable audit row.

mod classifier;
mod error;
mod gate;

pub use classifier::{Classifier, FailingClassifier, HangingClassifier, StaticClassifier};
pub use error::ClassifierError;
pub use gate::{Decision, ModerationGate};
