//! Per-viewer subscription tasks.
//!
//! Each subscription is one tokio task that owns a cursor into the
//! container's canonical order. The task registers on the change feed
//! before its first range query, so nothing committed can fall between
//! backfill and live delivery; every feed event (and every lag) degrades
//! to the same catch-up query, and the strictly-increasing cursor makes
//! delivery exactly-once no matter how often an item is seen.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::core_content::ContentStore;
use crate::core_store::model::{ContainerId, ContentId, ContentItem, ContentKey, ModerationStatus, UserId};
use crate::core_store::Store;

/// A delivered item, distinguishing fresh items from authoritative
/// replacements of an optimistic local echo.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Append to the view.
    Item(ContentItem),
    /// The authoritative version of an item the viewer already rendered
    /// optimistically; replace, do not append.
    Reconciled(ContentItem),
}

impl Delivery {
    pub fn item(&self) -> &ContentItem {
        match self {
            Delivery::Item(item) | Delivery::Reconciled(item) => item,
        }
    }
}

/// Subscription parameters.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Resume after this key instead of backfilling from the beginning.
    pub resume_from: Option<ContentKey>,
    /// Deliver flagged items regardless of author (moderation views).
    pub include_flagged: bool,
}

/// Fans committed content out to per-viewer subscriptions.
#[derive(Clone)]
pub struct RealtimeSync {
    store: Store,
    content: ContentStore,
}

impl RealtimeSync {
    pub fn new(store: Store) -> Self {
        Self {
            content: ContentStore::new(store.clone()),
            store,
        }
    }

    /// Subscribe a viewer to a container from the beginning.
    pub fn subscribe(&self, container: &ContainerId, viewer: &UserId) -> Subscription {
        self.subscribe_with(container, viewer, SubscribeOptions::default())
    }

    /// Subscribe with resume/visibility options.
    pub fn subscribe_with(
        &self,
        container: &ContainerId,
        viewer: &UserId,
        options: SubscribeOptions,
    ) -> Subscription {
        // Register on the feed before the first range query; a row
        // committed during backfill is then seen at least once, and the
        // cursor reduces that to exactly once.
        let feed_rx = self.store.feed().subscribe();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let echoes = Arc::new(Mutex::new(HashSet::new()));

        let task = SubscriptionTask {
            content: self.content.clone(),
            container: container.clone(),
            viewer: viewer.clone(),
            include_flagged: options.include_flagged,
            last_key: options.resume_from,
            echoes: Arc::clone(&echoes),
            deliveries: delivery_tx,
        };
        let handle = tokio::spawn(task.run(feed_rx));
        tracing::debug!(container = %container, viewer = %viewer, "subscription started");

        Subscription {
            deliveries: delivery_rx,
            echoes,
            task: handle,
        }
    }
}

/// A live subscription. Dropping it (or calling [`unsubscribe`]) stops
/// delivery immediately without affecting other viewers.
///
/// [`unsubscribe`]: Subscription::unsubscribe
pub struct Subscription {
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    echoes: Arc<Mutex<HashSet<ContentId>>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Next delivery, in canonical order. `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }

    /// Mark an id as rendered optimistically; its authoritative arrival
    /// will be delivered as [`Delivery::Reconciled`].
    pub fn note_local_echo(&self, id: ContentId) {
        if let Ok(mut echoes) = self.echoes.lock() {
            echoes.insert(id);
        }
    }

    /// Stop delivery now. Already-queued deliveries remain readable.
    pub fn unsubscribe(&mut self) {
        self.task.abort();
        self.deliveries.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct SubscriptionTask {
    content: ContentStore,
    container: ContainerId,
    viewer: UserId,
    include_flagged: bool,
    last_key: Option<ContentKey>,
    echoes: Arc<Mutex<HashSet<ContentId>>>,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

impl SubscriptionTask {
    async fn run(mut self, mut feed_rx: broadcast::Receiver<crate::core_store::ContentEvent>) {
        // Backfill everything past the cursor, then go live.
        if !self.deliver_newer() {
            return;
        }
        loop {
            match feed_rx.recv().await {
                Ok(event) => {
                    if event.container_id != self.container.as_str() {
                        continue;
                    }
                    if !self.deliver_newer() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // Missed notifications, not missed rows: the catch-up
                    // query recovers everything past the cursor.
                    tracing::debug!(container = %self.container, missed, "feed lagged; catching up");
                    if !self.deliver_newer() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Query and deliver all rows past the cursor. Returns false once the
    /// receiving side is gone.
    fn deliver_newer(&mut self) -> bool {
        let items = match self.content.fetch_since(&self.container, self.last_key.as_ref()) {
            Ok(items) => items,
            Err(err) => {
                // Keep the cursor; the next feed event retries the query.
                tracing::warn!(container = %self.container, error = %err, "catch-up query failed");
                return true;
            }
        };
        for item in items {
            // The cursor advances over hidden items too; visibility is a
            // filter, not a gap in the order.
            self.last_key = Some(item.key());
            if !self.visible(&item) {
                continue;
            }
            let delivery = if self.take_echo(&item.id) {
                Delivery::Reconciled(item)
            } else {
                Delivery::Item(item)
            };
            if self.deliveries.send(delivery).is_err() {
                return false;
            }
        }
        true
    }

    fn visible(&self, item: &ContentItem) -> bool {
        item.status != ModerationStatus::Flagged
            || self.include_flagged
            || item.author == self.viewer
    }

    fn take_echo(&self, id: &ContentId) -> bool {
        match self.echoes.lock() {
            Ok(mut echoes) => echoes.remove(id),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::model::{ClubId, Timestamp};
    use crate::core_store::ContentEvent;
    use rusqlite::params;
    use std::time::Duration;

    fn store_with_club(club: &str) -> Store {
        let store = Store::memory().unwrap();
        let conn = store.conn().unwrap();
        conn.execute(
            "INSERT INTO communities (id, name, college_name, created_at) VALUES ('comm', 'C', 'College', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO clubs (id, name, community_id, created_at) VALUES (?, 'Club', 'comm', 0)",
            params![club],
        )
        .unwrap();
        store
    }

    fn club(id: &str) -> ContainerId {
        ContainerId::Club(ClubId::new(id))
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    /// Insert a committed row and fire the feed, the way the publisher does.
    fn publish(store: &Store, container: &ContainerId, id: &str, author: &str, millis: u64) -> ContentItem {
        publish_with_status(store, container, id, author, millis, ModerationStatus::Approved)
    }

    fn publish_with_status(
        store: &Store,
        container: &ContainerId,
        id: &str,
        author: &str,
        millis: u64,
        status: ModerationStatus,
    ) -> ContentItem {
        let mut item = ContentItem {
            id: ContentId::new(id),
            container: container.clone(),
            author: uid(author),
            body: format!("body {id}"),
            status,
            moderation_reason: None,
            created_at: Timestamp::from_millis(millis),
        };
        item.created_at = ContentStore::new(store.clone()).insert(&item).unwrap();
        store.feed().publish(ContentEvent {
            container_id: container.as_str().to_string(),
            key: item.key(),
        });
        item
    }

    async fn collect(sub: &mut Subscription, n: usize) -> Vec<Delivery> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let delivery = tokio::time::timeout(Duration::from_secs(2), sub.recv())
                .await
                .expect("delivery within timeout")
                .expect("subscription alive");
            out.push(delivery);
        }
        out
    }

    async fn assert_silent(sub: &mut Subscription) {
        let res = tokio::time::timeout(Duration::from_millis(100), sub.recv()).await;
        assert!(res.is_err() || res.unwrap().is_none(), "unexpected delivery");
    }

    #[tokio::test]
    async fn test_backfill_then_live_in_canonical_order() {
        let store = store_with_club("club-1");
        let container = club("club-1");
        publish(&store, &container, "a", "u1", 100);
        publish(&store, &container, "b", "u1", 200);

        let sync = RealtimeSync::new(store.clone());
        let mut sub = sync.subscribe(&container, &uid("viewer"));

        publish(&store, &container, "c", "u1", 300);

        let ids: Vec<_> = collect(&mut sub, 3)
            .await
            .into_iter()
            .map(|d| d.item().id.0.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_all_viewers_see_the_same_sequence() {
        let store = store_with_club("club-1");
        let container = club("club-1");
        let sync = RealtimeSync::new(store.clone());

        // Two writers hit the same millisecond; commit order decides.
        publish(&store, &container, "b", "other", 100);
        publish(&store, &container, "a", "author", 100);

        let mut author_sub = sync.subscribe(&container, &uid("author"));
        let mut other_sub = sync.subscribe(&container, &uid("other"));

        publish(&store, &container, "c", "author", 200);

        let author_ids: Vec<_> = collect(&mut author_sub, 3)
            .await
            .into_iter()
            .map(|d| d.item().id.0.clone())
            .collect();
        let other_ids: Vec<_> = collect(&mut other_sub, 3)
            .await
            .into_iter()
            .map(|d| d.item().id.0.clone())
            .collect();

        // Identical order for everyone, the author included.
        assert_eq!(author_ids, other_ids);
        assert_eq!(author_ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_duplicate_feed_events_deliver_once() {
        let store = store_with_club("club-1");
        let container = club("club-1");
        let sync = RealtimeSync::new(store.clone());
        let mut sub = sync.subscribe(&container, &uid("viewer"));

        let item = publish(&store, &container, "a", "u1", 100);
        // A replayed notification for the same row.
        store.feed().publish(ContentEvent {
            container_id: container.as_str().to_string(),
            key: item.key(),
        });

        let deliveries = collect(&mut sub, 1).await;
        assert_eq!(deliveries[0].item().id.0, "a");
        assert_silent(&mut sub).await;
    }

    #[tokio::test]
    async fn test_same_millisecond_late_commit_still_delivers() {
        let store = store_with_club("club-1");
        let container = club("club-1");
        let sync = RealtimeSync::new(store.clone());
        let mut sub = sync.subscribe(&container, &uid("viewer"));

        // A row with a lexicographically smaller id commits second in the
        // same millisecond; its assigned key lands above the cursor, so it
        // is delivered rather than skipped.
        let first = publish(&store, &container, "zzz", "u1", 100);
        let second = publish(&store, &container, "aaa", "u2", 100);
        assert!(second.key() > first.key());

        let ids: Vec<_> = collect(&mut sub, 2)
            .await
            .into_iter()
            .map(|d| d.item().id.0.clone())
            .collect();
        assert_eq!(ids, vec!["zzz", "aaa"]);

        // A fresh subscriber backfills the same sequence; views converge.
        let mut late_sub = sync.subscribe(&container, &uid("late"));
        let late_ids: Vec<_> = collect(&mut late_sub, 2)
            .await
            .into_iter()
            .map(|d| d.item().id.0.clone())
            .collect();
        assert_eq!(late_ids, ids);
    }

    #[tokio::test]
    async fn test_resume_picks_up_exactly_after_last_key() {
        let store = store_with_club("club-1");
        let container = club("club-1");
        let sync = RealtimeSync::new(store.clone());

        let mut sub = sync.subscribe(&container, &uid("viewer"));
        publish(&store, &container, "a", "u1", 100);
        publish(&store, &container, "b", "u1", 200);
        let seen = collect(&mut sub, 2).await;
        let last_key = seen.last().unwrap().item().key();
        sub.unsubscribe();

        // Rows land while the viewer is disconnected.
        publish(&store, &container, "c", "u1", 300);

        let mut resumed = sync.subscribe_with(
            &container,
            &uid("viewer"),
            SubscribeOptions {
                resume_from: Some(last_key),
                ..Default::default()
            },
        );
        publish(&store, &container, "d", "u1", 400);

        let ids: Vec<_> = collect(&mut resumed, 2)
            .await
            .into_iter()
            .map(|d| d.item().id.0.clone())
            .collect();
        // No repeats of a/b, no gap at c.
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_local_echo_is_reconciled_not_appended() {
        let store = store_with_club("club-1");
        let container = club("club-1");
        let sync = RealtimeSync::new(store.clone());
        let mut sub = sync.subscribe(&container, &uid("author"));

        sub.note_local_echo(ContentId::new("mine"));
        publish(&store, &container, "mine", "author", 100);
        publish(&store, &container, "theirs", "other", 200);

        let deliveries = collect(&mut sub, 2).await;
        assert!(matches!(&deliveries[0], Delivery::Reconciled(item) if item.id.0 == "mine"));
        assert!(matches!(&deliveries[1], Delivery::Item(item) if item.id.0 == "theirs"));
    }

    #[tokio::test]
    async fn test_flagged_items_delivered_only_to_author() {
        let store = store_with_club("club-1");
        let container = club("club-1");
        let sync = RealtimeSync::new(store.clone());

        let mut author_sub = sync.subscribe(&container, &uid("author"));
        let mut other_sub = sync.subscribe(&container, &uid("other"));
        let mut moderation_sub = sync.subscribe_with(
            &container,
            &uid("moderator"),
            SubscribeOptions {
                include_flagged: true,
                ..Default::default()
            },
        );

        publish_with_status(&store, &container, "bad", "author", 100, ModerationStatus::Flagged);
        publish(&store, &container, "ok", "author", 200);

        let author_ids: Vec<_> = collect(&mut author_sub, 2)
            .await
            .into_iter()
            .map(|d| d.item().id.0.clone())
            .collect();
        assert_eq!(author_ids, vec!["bad", "ok"]);

        // The other viewer skips the flagged item but keeps its place in
        // the order.
        let other_ids: Vec<_> = collect(&mut other_sub, 1)
            .await
            .into_iter()
            .map(|d| d.item().id.0.clone())
            .collect();
        assert_eq!(other_ids, vec!["ok"]);
        assert_silent(&mut other_sub).await;

        let moderation_ids: Vec<_> = collect(&mut moderation_sub, 2)
            .await
            .into_iter()
            .map(|d| d.item().id.0.clone())
            .collect();
        assert_eq!(moderation_ids, vec!["bad", "ok"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery_for_one_viewer_only() {
        let store = store_with_club("club-1");
        let container = club("club-1");
        let sync = RealtimeSync::new(store.clone());

        let mut leaving = sync.subscribe(&container, &uid("leaving"));
        let mut staying = sync.subscribe(&container, &uid("staying"));

        leaving.unsubscribe();
        publish(&store, &container, "a", "u1", 100);

        assert_eq!(collect(&mut staying, 1).await[0].item().id.0, "a");
        assert!(leaving.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_events_for_other_containers_are_ignored() {
        let store = store_with_club("club-1");
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "INSERT INTO clubs (id, name, community_id, created_at) VALUES ('club-2', 'Other', 'comm', 0)",
                [],
            )
            .unwrap();
        }
        let sync = RealtimeSync::new(store.clone());
        let mut sub = sync.subscribe(&club("club-1"), &uid("viewer"));

        publish(&store, &club("club-2"), "elsewhere", "u1", 100);
        publish(&store, &club("club-1"), "here", "u1", 200);

        let deliveries = collect(&mut sub, 1).await;
        assert_eq!(deliveries[0].item().id.0, "here");
        assert_silent(&mut sub).await;
    }
}
