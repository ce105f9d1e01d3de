//! The classifier seam.
//!
//! A classifier returns a raw structured response for a piece of text; the
//! gate owns parsing and the fail-open policy. Keeping the trait this thin
//! lets any remote model endpoint sit behind it, and makes timeout and
//! parse failures testable with the doubles below.

use async_trait::async_trait;

use super::error::ClassifierError;

/// Classifies text for policy violations, returning the raw response body.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<String, ClassifierError>;
}

/// A classifier with a canned response.
pub struct StaticClassifier {
    response: String,
}

impl StaticClassifier {
    /// Responds with the given raw body for every input.
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }

    /// A classifier that flags everything with the given reason.
    pub fn flagging(reason: &str) -> Self {
        Self::with_response(format!(
            r#"{{"flagged": true, "reason": "{reason}", "confidence": 0.97}}"#
        ))
    }

    /// A classifier that approves everything.
    pub fn approving() -> Self {
        Self::with_response(r#"{"flagged": false}"#)
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    async fn classify(&self, _text: &str) -> Result<String, ClassifierError> {
        Ok(self.response.clone())
    }
}

/// A classifier whose calls always fail.
pub struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    async fn classify(&self, _text: &str) -> Result<String, ClassifierError> {
        Err(ClassifierError::Unavailable("simulated outage".to_string()))
    }
}

/// A classifier that never answers, for timeout tests.
pub struct HangingClassifier;

#[async_trait]
impl Classifier for HangingClassifier {
    async fn classify(&self, _text: &str) -> Result<String, ClassifierError> {
        std::future::pending().await
    }
}
