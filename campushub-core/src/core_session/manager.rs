//! The session manager: a single-threaded actor owning "who is signed in".
//!
//! All provider callbacks are modeled as an ordered event channel consumed
//! by one task, so there is no ambient mutable current-user state and no
//! interleaved-callback races. Observers watch transitions through a
//! `tokio::sync::watch` channel; operations go through a command channel
//! with reply oneshots.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use super::event::{AuthEvent, AuthEventKind};
use super::profiles::ProfileStore;
use super::provider::IdentityProvider;
use super::session::{Profile, Role, Session, SessionSnapshot};
use super::SessionError;
use crate::core_store::model::{Timestamp, UserId};

/// Commands sent to the session actor.
enum SessionCommand {
    /// Resolve the current session, retrying a missing profile.
    Resolve {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// Explicitly revoke the current session (terminal).
    Revoke { reply: oneshot::Sender<()> },
    /// Stop the actor.
    Shutdown,
}

/// Handle to the running session manager.
///
/// Cheap to clone; every component that needs identity holds one of these
/// instead of reading a global.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    watch_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Resolve the current session state.
    ///
    /// If the session is valid but its profile failed to load earlier, the
    /// fetch is retried here (best-effort resolution).
    pub async fn resolve(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Resolve { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }

    /// Resolve and require an authenticated session.
    pub async fn require_session(&self) -> Result<Session, SessionError> {
        match self.resolve().await? {
            SessionSnapshot::Authenticated(session) => Ok(session),
            _ => Err(SessionError::Unauthenticated),
        }
    }

    /// Register for session transitions. Every provider-reported
    /// transition is observable on the returned receiver.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.watch_rx.clone()
    }

    /// The last-published snapshot, without a round trip to the actor.
    pub fn current(&self) -> SessionSnapshot {
        self.watch_rx.borrow().clone()
    }

    /// Explicitly revoke the current session.
    pub async fn revoke(&self) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Revoke { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }

    /// Stop the session manager.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }
}

/// Spawns the session manager actor.
///
/// `events` is the ordered lifecycle stream from the identity provider;
/// `admin_secret` is the shared secret of the administrative gate.
pub fn spawn_session_manager(
    provider: Arc<dyn IdentityProvider>,
    events: mpsc::Receiver<AuthEvent>,
    profiles: ProfileStore,
    admin_secret: String,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (watch_tx, watch_rx) = watch::channel(SessionSnapshot::Unknown);

    let actor = SessionActor {
        provider,
        events,
        commands: cmd_rx,
        profiles,
        admin_secret,
        snapshot: SessionSnapshot::Unknown,
        last_seq: 0,
        watch_tx,
    };
    tokio::spawn(actor.run());

    SessionHandle {
        commands: cmd_tx,
        watch_rx,
    }
}

struct SessionActor {
    provider: Arc<dyn IdentityProvider>,
    events: mpsc::Receiver<AuthEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    profiles: ProfileStore,
    admin_secret: String,
    snapshot: SessionSnapshot,
    last_seq: u64,
    watch_tx: watch::Sender<SessionSnapshot>,
}

impl SessionActor {
    async fn run(mut self) {
        self.startup_lookup().await;

        let mut events_closed = false;
        loop {
            tokio::select! {
                // Events drain before commands so a resolve issued after a
                // sign-in always observes it.
                biased;

                maybe_event = self.events.recv(), if !events_closed => {
                    match maybe_event {
                        Some(event) => self.apply_event(event),
                        None => events_closed = true,
                    }
                }
                maybe_cmd = self.commands.recv() => {
                    match maybe_cmd {
                        Some(SessionCommand::Resolve { reply }) => {
                            self.retry_profile_if_missing();
                            let _ = reply.send(self.snapshot.clone());
                        }
                        Some(SessionCommand::Revoke { reply }) => {
                            self.handle_revoke();
                            let _ = reply.send(());
                        }
                        Some(SessionCommand::Shutdown) | None => break,
                    }
                }
            }
        }

        tracing::info!("session manager stopped");
    }

    /// One blocking lookup of an existing session before serving anything.
    async fn startup_lookup(&mut self) {
        match self.provider.current_session().await {
            Ok(Some(provider_session)) => {
                let profile = self.resolve_profile(
                    &provider_session.subject_id,
                    &provider_session.name,
                    false,
                );
                tracing::info!(subject_id = %provider_session.subject_id, "found existing session");
                self.transition(SessionSnapshot::Authenticated(Session {
                    subject_id: provider_session.subject_id,
                    profile,
                    issued_at: provider_session.issued_at,
                }));
            }
            Ok(None) => {
                tracing::debug!("no existing session");
                self.transition(SessionSnapshot::Unauthenticated);
            }
            Err(err) => {
                // Fail open on transient provider errors: only go
                // Unauthenticated when there is no prior valid session.
                tracing::warn!(error = %err, "session lookup failed");
                if !self.snapshot.is_authenticated() {
                    self.transition(SessionSnapshot::Unauthenticated);
                }
            }
        }
    }

    fn apply_event(&mut self, event: AuthEvent) {
        if event.seq <= self.last_seq {
            tracing::debug!(seq = event.seq, last_seq = self.last_seq, "stale auth event discarded");
            return;
        }
        self.last_seq = event.seq;

        match event.kind {
            AuthEventKind::SignedIn {
                subject_id,
                name,
                admin_code,
            } => {
                let is_admin = match self.verify_admin_code(admin_code.as_deref()) {
                    Ok(is_admin) => is_admin,
                    Err(err) => {
                        tracing::warn!(subject_id = %subject_id, error = %err, "sign-in rejected");
                        self.transition(SessionSnapshot::Unauthenticated);
                        return;
                    }
                };
                let profile = self.resolve_profile(&subject_id, &name, is_admin);
                tracing::info!(subject_id = %subject_id, seq = event.seq, "signed in");
                self.transition(SessionSnapshot::Authenticated(Session {
                    subject_id,
                    profile,
                    issued_at: Timestamp::now(),
                }));
            }
            AuthEventKind::SignedOut => {
                tracing::info!(seq = event.seq, "signed out");
                self.transition(SessionSnapshot::Unauthenticated);
            }
            AuthEventKind::TokenRefreshed { subject_id } => {
                match &self.snapshot {
                    SessionSnapshot::Authenticated(session)
                        if session.subject_id == subject_id =>
                    {
                        let mut refreshed = session.clone();
                        refreshed.issued_at = Timestamp::now();
                        self.transition(SessionSnapshot::Authenticated(refreshed));
                    }
                    // A refresh cannot establish a session: there is no
                    // Unauthenticated -> Authenticated edge without
                    // re-validated credentials.
                    _ => {
                        tracing::debug!(subject_id = %subject_id, "token refresh ignored");
                    }
                }
            }
        }
    }

    /// Check a supplied admin code against the configured secret.
    ///
    /// No code means an ordinary sign-in; a wrong code is a hard failure,
    /// never a silent downgrade to a non-admin session.
    fn verify_admin_code(&self, code: Option<&str>) -> Result<bool, SessionError> {
        match code {
            None => Ok(false),
            Some(code) if !self.admin_secret.is_empty() && code == self.admin_secret => Ok(true),
            Some(_) => Err(SessionError::AdminSecretMismatch),
        }
    }

    /// Best-effort profile resolution: fetch, lazily create on first
    /// session, elevate on a validated admin code. A store failure yields
    /// `None` and the session stays valid.
    fn resolve_profile(&self, subject_id: &UserId, name: &str, is_admin: bool) -> Option<Profile> {
        match self.profiles.get(subject_id) {
            Ok(Some(mut profile)) => {
                if is_admin && profile.role != Role::Admin {
                    match self.profiles.elevate_to_admin(subject_id) {
                        Ok(()) => profile.role = Role::Admin,
                        Err(err) => {
                            tracing::warn!(subject_id = %subject_id, error = %err, "admin elevation failed")
                        }
                    }
                }
                Some(profile)
            }
            Ok(None) => {
                let fresh = Profile {
                    id: subject_id.clone(),
                    name: name.to_string(),
                    role: if is_admin { Role::Admin } else { Role::Junior },
                    mentorship_available: false,
                };
                match self.profiles.create_if_absent(&fresh) {
                    Ok(stored) => Some(stored),
                    Err(err) => {
                        tracing::warn!(subject_id = %subject_id, error = %err, "profile creation failed");
                        None
                    }
                }
            }
            Err(err) => {
                tracing::warn!(subject_id = %subject_id, error = %err, "profile fetch failed");
                None
            }
        }
    }

    /// Retry a failed profile fetch on access.
    fn retry_profile_if_missing(&mut self) {
        if let SessionSnapshot::Authenticated(session) = &self.snapshot {
            if session.profile.is_none() {
                let name = session.subject_id.as_str().to_string();
                let profile = self.resolve_profile(&session.subject_id, &name, false);
                if profile.is_some() {
                    let mut updated = session.clone();
                    updated.profile = profile;
                    self.transition(SessionSnapshot::Authenticated(updated));
                }
            }
        }
    }

    fn handle_revoke(&mut self) {
        if let SessionSnapshot::Authenticated(session) = &self.snapshot {
            tracing::info!(subject_id = %session.subject_id, "session revoked");
            self.transition(SessionSnapshot::Unauthenticated);
        }
    }

    fn transition(&mut self, next: SessionSnapshot) {
        self.snapshot = next.clone();
        let _ = self.watch_tx.send(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_session::provider::{StaticProvider, UnavailableProvider};
    use crate::core_store::Store;

    const SECRET: &str = "campus-admin-secret";

    struct Rig {
        handle: SessionHandle,
        events: mpsc::Sender<AuthEvent>,
        profiles: ProfileStore,
    }

    fn rig_with_provider(provider: Arc<dyn IdentityProvider>) -> Rig {
        let store = Store::memory().expect("store");
        let profiles = ProfileStore::new(store);
        let (event_tx, event_rx) = mpsc::channel(32);
        let handle = spawn_session_manager(
            provider,
            event_rx,
            profiles.clone(),
            SECRET.to_string(),
        );
        Rig {
            handle,
            events: event_tx,
            profiles,
        }
    }

    fn rig() -> Rig {
        rig_with_provider(Arc::new(StaticProvider::signed_out()))
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    #[tokio::test]
    async fn test_startup_without_session_is_unauthenticated() {
        let rig = rig();
        let snapshot = rig.handle.resolve().await.unwrap();
        assert_eq!(snapshot, SessionSnapshot::Unauthenticated);
    }

    #[tokio::test]
    async fn test_startup_with_existing_session_is_authenticated() {
        let rig = rig_with_provider(Arc::new(StaticProvider::signed_in(uid("u1"), "Asha")));
        let snapshot = rig.handle.resolve().await.unwrap();

        let session = snapshot.session().expect("authenticated");
        assert_eq!(session.subject_id, uid("u1"));
        // Profile was lazily created with the default role.
        let profile = session.profile.as_ref().expect("profile");
        assert_eq!(profile.role, Role::Junior);
        assert_eq!(profile.name, "Asha");
    }

    #[tokio::test]
    async fn test_startup_provider_error_without_prior_session() {
        let rig = rig_with_provider(Arc::new(UnavailableProvider));
        let snapshot = rig.handle.resolve().await.unwrap();
        assert_eq!(snapshot, SessionSnapshot::Unauthenticated);
    }

    #[tokio::test]
    async fn test_sign_in_then_sign_out() {
        let rig = rig();
        rig.events
            .send(AuthEvent::signed_in(1, uid("u1"), "Asha"))
            .await
            .unwrap();
        assert!(rig.handle.resolve().await.unwrap().is_authenticated());

        rig.events.send(AuthEvent::signed_out(2)).await.unwrap();
        assert_eq!(
            rig.handle.resolve().await.unwrap(),
            SessionSnapshot::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_stale_sign_in_cannot_override_sign_out() {
        let rig = rig();
        rig.events.send(AuthEvent::signed_out(5)).await.unwrap();
        // A delayed SignedIn with a lower provider sequence arrives late.
        rig.events
            .send(AuthEvent::signed_in(3, uid("u1"), "Asha"))
            .await
            .unwrap();

        assert_eq!(
            rig.handle.resolve().await.unwrap(),
            SessionSnapshot::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_duplicate_sequence_discarded() {
        let rig = rig();
        rig.events
            .send(AuthEvent::signed_in(1, uid("u1"), "Asha"))
            .await
            .unwrap();
        // Replay of the same sequence with a different subject.
        rig.events
            .send(AuthEvent::signed_in(1, uid("u2"), "Zoe"))
            .await
            .unwrap();

        let snapshot = rig.handle.resolve().await.unwrap();
        assert_eq!(snapshot.session().unwrap().subject_id, uid("u1"));
    }

    #[tokio::test]
    async fn test_admin_code_correct_yields_admin_role() {
        let rig = rig();
        rig.events
            .send(AuthEvent::signed_in_with_code(1, uid("u1"), "Asha", SECRET))
            .await
            .unwrap();

        let snapshot = rig.handle.resolve().await.unwrap();
        let profile = snapshot.session().unwrap().profile.clone().unwrap();
        assert_eq!(profile.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_admin_code_elevates_existing_account() {
        let rig = rig();
        rig.events
            .send(AuthEvent::signed_in(1, uid("u1"), "Asha"))
            .await
            .unwrap();
        rig.events.send(AuthEvent::signed_out(2)).await.unwrap();
        rig.events
            .send(AuthEvent::signed_in_with_code(3, uid("u1"), "Asha", SECRET))
            .await
            .unwrap();

        let snapshot = rig.handle.resolve().await.unwrap();
        assert_eq!(
            snapshot.session().unwrap().profile.clone().unwrap().role,
            Role::Admin
        );
        // The stored row was updated too, not just the session copy.
        let stored = rig.profiles.get(&uid("u1")).unwrap().unwrap();
        assert_eq!(stored.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_admin_code_mismatch_is_hard_failure() {
        let rig = rig();
        rig.events
            .send(AuthEvent::signed_in_with_code(1, uid("u1"), "Asha", "wrong"))
            .await
            .unwrap();

        // Not a silent downgrade: no session at all.
        assert_eq!(
            rig.handle.resolve().await.unwrap(),
            SessionSnapshot::Unauthenticated
        );
        // And no profile row was created.
        assert!(rig.profiles.get(&uid("u1")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_refresh_keeps_session() {
        let rig = rig();
        rig.events
            .send(AuthEvent::signed_in(1, uid("u1"), "Asha"))
            .await
            .unwrap();
        let before = rig.handle.resolve().await.unwrap();

        rig.events
            .send(AuthEvent::token_refreshed(2, uid("u1")))
            .await
            .unwrap();
        let after = rig.handle.resolve().await.unwrap();

        let before = before.session().unwrap();
        let after = after.session().unwrap();
        assert_eq!(before.subject_id, after.subject_id);
        assert!(after.issued_at >= before.issued_at);
    }

    #[tokio::test]
    async fn test_token_refresh_cannot_establish_session() {
        let rig = rig();
        rig.events
            .send(AuthEvent::token_refreshed(1, uid("u1")))
            .await
            .unwrap();

        assert_eq!(
            rig.handle.resolve().await.unwrap(),
            SessionSnapshot::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_revoke_is_terminal() {
        let rig = rig();
        rig.events
            .send(AuthEvent::signed_in(1, uid("u1"), "Asha"))
            .await
            .unwrap();
        assert!(rig.handle.resolve().await.unwrap().is_authenticated());

        rig.handle.revoke().await.unwrap();
        assert_eq!(
            rig.handle.resolve().await.unwrap(),
            SessionSnapshot::Unauthenticated
        );

        // A refresh for the revoked subject cannot bring it back.
        rig.events
            .send(AuthEvent::token_refreshed(2, uid("u1")))
            .await
            .unwrap();
        assert_eq!(
            rig.handle.resolve().await.unwrap(),
            SessionSnapshot::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_watch_observes_transitions() {
        let rig = rig();
        let mut watch_rx = rig.handle.watch();

        rig.events
            .send(AuthEvent::signed_in(1, uid("u1"), "Asha"))
            .await
            .unwrap();
        // Force the event through the actor.
        rig.handle.resolve().await.unwrap();

        watch_rx.changed().await.ok();
        assert!(watch_rx.borrow().is_authenticated());
    }

    #[tokio::test]
    async fn test_require_session_errors_when_unauthenticated() {
        let rig = rig();
        let err = rig.handle.require_session().await.unwrap_err();
        assert!(matches!(err, SessionError::Unauthenticated));
    }
}
