//! The moderation gate: classify, decide, audit.
//!
//! Moderation advises but never blocks: a classifier outage, timeout, or
//! malformed response yields a clean (fail-open) decision and the publish
//! proceeds. Only a well-formed response saying `flagged: true` marks
//! content. Flagged decisions leave exactly one audit row, written after
//! the content row exists.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::classifier::Classifier;
use crate::core_store::model::{ContentId, Timestamp};
use crate::core_store::{Store, StoreResult};

/// The gate's verdict on a piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub flagged: bool,
    pub reason: Option<String>,
    pub confidence: Option<f64>,
}

impl Decision {
    /// The fail-open decision: not flagged, no reason, no confidence.
    pub fn approved() -> Self {
        Decision {
            flagged: false,
            reason: None,
            confidence: None,
        }
    }
}

/// Wire shape of a classifier response. Strict: an unknown field means the
/// response is not trustworthy, and an untrusted response fails open.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDecision {
    flagged: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Moderation gate over a classifier and the audit log.
#[derive(Clone)]
pub struct ModerationGate {
    store: Store,
    classifier: Option<Arc<dyn Classifier>>,
    timeout: Duration,
}

impl ModerationGate {
    /// A gate backed by `classifier`, with each call bounded by `timeout`.
    pub fn new(store: Store, classifier: Arc<dyn Classifier>, timeout: Duration) -> Self {
        Self {
            store,
            classifier: Some(classifier),
            timeout,
        }
    }

    /// A gate with moderation turned off: every evaluation is clean.
    pub fn disabled(store: Store) -> Self {
        Self {
            store,
            classifier: None,
            timeout: Duration::ZERO,
        }
    }

    /// Build the gate from the moderation section of the configuration:
    /// disabled config means a disabled gate, otherwise the classifier is
    /// bounded by the configured timeout.
    pub fn from_config(
        store: Store,
        config: &crate::config::ModerationConfig,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        if config.enabled {
            Self::new(store, classifier, config.classifier_timeout)
        } else {
            Self::disabled(store)
        }
    }

    /// Evaluate text. Never errors; every failure mode fails open.
    pub async fn evaluate(&self, text: &str) -> Decision {
        let Some(classifier) = &self.classifier else {
            return Decision::approved();
        };

        let raw = match tokio::time::timeout(self.timeout, classifier.classify(text)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "classifier call failed; failing open");
                return Decision::approved();
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64,
                    "classifier timed out; failing open");
                return Decision::approved();
            }
        };

        match serde_json::from_str::<RawDecision>(&raw) {
            Ok(parsed) => Decision {
                flagged: parsed.flagged,
                reason: parsed.reason,
                confidence: parsed.confidence,
            },
            Err(err) => {
                tracing::warn!(error = %err, "classifier response rejected; failing open");
                Decision::approved()
            }
        }
    }

    /// Record the audit row for a flagged decision.
    ///
    /// Clean decisions leave no audit trail. The `content_id` primary key
    /// makes this at-most-once: re-recording after a retry is a no-op.
    /// Must run after the content row exists (the log references it).
    pub fn record(&self, content_id: &ContentId, decision: &Decision) -> StoreResult<()> {
        if !decision.flagged {
            return Ok(());
        }
        let conn = self.store.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO moderation_log (content_id, flagged, reason, confidence, resolved_at)
             VALUES (?, 1, ?, ?, ?)",
            rusqlite::params![
                content_id.as_str(),
                decision.reason.as_deref(),
                decision.confidence,
                Timestamp::now().as_millis() as i64,
            ],
        )?;
        tracing::debug!(content_id = %content_id, "moderation audit recorded");
        Ok(())
    }

    /// Backfill audit rows for flagged content that has none (a crash
    /// between the content insert and the audit insert leaves this gap).
    /// Returns the number of rows inserted.
    pub fn reconcile_missing_audits(&self) -> StoreResult<u64> {
        let conn = self.store.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO moderation_log (content_id, flagged, reason, confidence, resolved_at)
             SELECT id, 1, moderation_reason, NULL, ?
             FROM content_items
             WHERE status = 'flagged'
               AND id NOT IN (SELECT content_id FROM moderation_log)",
            rusqlite::params![Timestamp::now().as_millis() as i64],
        )?;
        if inserted > 0 {
            tracing::info!(backfilled = inserted, "reconciled missing moderation audits");
        }
        Ok(inserted as u64)
    }
}
