//! The publish pipeline.
//!
//! Order matters: session, membership, moderation, insert, feed, audit.
//! The content row commits before the feed fires, so every event points at
//! a readable row; the audit row is written last and repaired by
//! reconciliation if the process dies in between.

use super::error::{PublishError, PublishResult};
use super::storage::ContentStore;
use crate::core_membership::MembershipLedger;
use crate::core_moderation::ModerationGate;
use crate::core_session::{SessionError, SessionHandle};
use crate::core_store::model::{
    ContainerId, ContentId, ContentItem, ModerationStatus, Timestamp, UserId,
};
use crate::core_store::{ContentEvent, Store};

/// Publishes club posts and chat messages. Cheap to clone.
#[derive(Clone)]
pub struct ContentPublisher {
    store: Store,
    content: ContentStore,
    session: SessionHandle,
    ledger: MembershipLedger,
    gate: ModerationGate,
}

impl ContentPublisher {
    pub fn new(
        store: Store,
        session: SessionHandle,
        ledger: MembershipLedger,
        gate: ModerationGate,
    ) -> Self {
        Self {
            content: ContentStore::new(store.clone()),
            store,
            session,
            ledger,
            gate,
        }
    }

    /// Read-path access to the stored content.
    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Publish `body` to a container as `author`.
    ///
    /// A flagged moderation outcome is not an error: the item is stored
    /// with reduced visibility and returned. Only authentication,
    /// membership, and store failures reject the publish, and a rejected
    /// publish writes nothing.
    pub async fn publish(
        &self,
        author: &UserId,
        container: &ContainerId,
        body: &str,
    ) -> PublishResult<ContentItem> {
        let session = self.session.require_session().await.map_err(|err| match err {
            SessionError::Unauthenticated => PublishError::Unauthenticated,
            other => {
                tracing::warn!(error = %other, "session resolution failed during publish");
                PublishError::Unauthenticated
            }
        })?;
        if session.subject_id != *author {
            return Err(PublishError::Unauthenticated);
        }

        match container {
            ContainerId::Club(club_id) => {
                if !self.content.container_exists(container)? {
                    return Err(PublishError::NotFound("club"));
                }
                if !self.ledger.is_club_member(author, club_id).await? {
                    return Err(PublishError::NotAMember);
                }
            }
            ContainerId::Room(room_id) => {
                // Chat-room semantics: publishing auto-joins, and a
                // concurrent join from another device is not an error.
                self.ledger.join_room(author, room_id).await?;
            }
        }

        let decision = self.gate.evaluate(body).await;
        let mut item = ContentItem {
            id: ContentId::generate(),
            container: container.clone(),
            author: author.clone(),
            body: body.to_string(),
            status: if decision.flagged {
                ModerationStatus::Flagged
            } else {
                ModerationStatus::Approved
            },
            moderation_reason: decision.reason.clone(),
            created_at: Timestamp::now(),
        };

        // The store assigns the final position; wall-clock time is only a
        // lower bound, so concurrent same-millisecond publishes still get
        // keys in commit order.
        item.created_at = self.content.insert(&item)?;
        self.store.feed().publish(ContentEvent {
            container_id: container.as_str().to_string(),
            key: item.key(),
        });

        if decision.flagged {
            tracing::info!(content_id = %item.id, reason = ?decision.reason, "content flagged");
            // The item is committed; a failed audit write is repaired by
            // reconciliation, not by failing the publish.
            if let Err(err) = self.gate.record(&item.id, &decision) {
                tracing::warn!(content_id = %item.id, error = %err, "moderation audit write failed");
            }
        }

        tracing::debug!(content_id = %item.id, container = %container, "published");
        Ok(item)
    }
}
