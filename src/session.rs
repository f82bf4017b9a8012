use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::watch;
use ts_rs::TS;

use crate::{
    classifier::{ErrorKind, classify},
    models::{Identity, Role},
    transport::TransportState,
};

/// Identity oracle endpoint.
pub const IDENTITY_PATH: &str = "/auth/me";
/// Logout trigger endpoint.
pub const LOGOUT_PATH: &str = "/auth/logout";

/// SessionPhase
///
/// `Uninitialized -> Bootstrapping -> {Authenticated, Unauthenticated}`, and back to
/// `Uninitialized` on logout or invalidation.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    Uninitialized,
    Bootstrapping,
    Authenticated(Identity),
    Unauthenticated,
}

/// Session
///
/// Read-only snapshot of the tab's session. Built from a `SessionPhase`, so the
/// invariants hold by construction: role and identity exist only when authenticated,
/// and nothing is meaningful while bootstrapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    phase: SessionPhase,
    // Number of times the store has resolved out of bootstrapping.
    generation: u64,
}

impl Session {
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Counts resolutions out of bootstrapping. Two reads with different generations
    /// saw different resolutions even when the phases compare equal.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True until the identity oracle has answered. `Uninitialized` counts as
    /// bootstrapping: nothing has been resolved yet.
    pub fn is_bootstrapping(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Uninitialized | SessionPhase::Bootstrapping
        )
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase, SessionPhase::Authenticated(_))
    }

    pub fn role(&self) -> Option<&Role> {
        self.user().map(|identity| &identity.role)
    }

    pub fn user(&self) -> Option<&Identity> {
        match &self.phase {
            SessionPhase::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// The flat shape handed to the presentation layer.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            authenticated: self.is_authenticated(),
            role: self.role().map(|role| role.to_string()),
            user: self.user().cloned(),
            bootstrapping: self.is_bootstrapping(),
        }
    }
}

/// SessionSnapshot
///
/// Serialized session exported to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub role: Option<String>,
    pub user: Option<Identity>,
    pub bootstrapping: bool,
}

/// Oracle bodies arrive either bare or wrapped in `{"user": ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdentityEnvelope {
    Wrapped { user: Identity },
    Bare(Identity),
}

fn parse_identity(body: Value) -> Result<Identity, serde_json::Error> {
    serde_json::from_value::<IdentityEnvelope>(body).map(|envelope| match envelope {
        IdentityEnvelope::Wrapped { user } => user,
        IdentityEnvelope::Bare(identity) => identity,
    })
}

/// SessionSubscription
///
/// Receiving end of the store's state. Dropping it unsubscribes.
pub type SessionSubscription = watch::Receiver<Session>;

struct Inner {
    transport: TransportState,
    bootstrap_timeout: Duration,
    state: watch::Sender<Session>,
    // Serializes bootstrap attempts: at most one identity fetch in flight.
    bootstrap_lock: tokio::sync::Mutex<()>,
    // Bumped on every invalidation; a bootstrap only commits if it is unchanged.
    epoch: AtomicU64,
}

/// SessionStore
///
/// The single source of truth for the tab's session. Cheap to clone; every clone
/// shares the same state. All mutation goes through `bootstrap`, `invalidate`,
/// `logout` and `refresh`.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(transport: TransportState, bootstrap_timeout: Duration) -> Self {
        let (state, _) = watch::channel(Session {
            phase: SessionPhase::Uninitialized,
            generation: 0,
        });
        Self {
            inner: Arc::new(Inner {
                transport,
                bootstrap_timeout,
                state,
                bootstrap_lock: tokio::sync::Mutex::new(()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn get_state(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> SessionSubscription {
        self.inner.state.subscribe()
    }

    fn transition(&self, phase: SessionPhase) {
        tracing::debug!(?phase, "session transition");
        self.inner.state.send_modify(|session| {
            if matches!(
                phase,
                SessionPhase::Authenticated(_) | SessionPhase::Unauthenticated
            ) {
                session.generation += 1;
            }
            session.phase = phase;
        });
    }

    /// bootstrap
    ///
    /// Idempotent. Issues the identity fetch only from `Uninitialized`; a caller that
    /// arrives while a fetch is in flight waits for it and returns its outcome.
    ///
    /// 1. Serialization: waiting on the bootstrap lock, so one fetch is in flight.
    /// 2. Phase Check: a resolved store is returned as is.
    /// 3. Identity Fetch: bounded by the bootstrap timeout.
    /// 4. Resolution: a failed, timed out or unusable answer is `Unauthenticated`.
    /// 5. Commit: skipped when an invalidation happened during the fetch. The
    ///    invalidating caller owns the next bootstrap.
    pub async fn bootstrap(&self) -> Session {
        // 1. Serialization
        let _guard = self.inner.bootstrap_lock.lock().await;

        // 2. Phase Check
        if self.get_state().phase != SessionPhase::Uninitialized {
            return self.get_state();
        }

        // 3. Identity Fetch
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        self.transition(SessionPhase::Bootstrapping);

        let outcome = tokio::time::timeout(
            self.inner.bootstrap_timeout,
            self.inner.transport.get_json(IDENTITY_PATH, &[]),
        )
        .await;

        // 4. Resolution
        let phase = match outcome {
            Ok(Ok(body)) => match parse_identity(body) {
                Ok(identity) if identity.role.as_str().is_empty() => {
                    tracing::warn!(user_id = %identity.id, "identity carries no role");
                    SessionPhase::Unauthenticated
                }
                Ok(identity) => {
                    tracing::info!(user_id = %identity.id, role = %identity.role, "session authenticated");
                    SessionPhase::Authenticated(identity)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "identity oracle returned an unusable identity");
                    SessionPhase::Unauthenticated
                }
            },
            Ok(Err(e)) => {
                let classified = classify(&e);
                if classified.kind == ErrorKind::Auth {
                    tracing::info!("no valid session");
                } else {
                    tracing::warn!(error = %classified, "identity oracle failed");
                }
                SessionPhase::Unauthenticated
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.inner.bootstrap_timeout.as_millis() as u64,
                    "identity oracle did not answer in time"
                );
                SessionPhase::Unauthenticated
            }
        };

        // 5. Commit
        // An invalidation during the fetch already reset the store; drop the result.
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("discarding bootstrap result superseded by invalidation");
            return self.get_state();
        }

        self.transition(phase);
        self.get_state()
    }

    /// invalidate
    ///
    /// Synchronously returns the store to `Uninitialized`, clearing role and identity
    /// in the same step. The store stays there until the next `bootstrap`; `logout`
    /// and `refresh` pair the two.
    pub fn invalidate(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.transition(SessionPhase::Uninitialized);
    }

    /// logout
    ///
    /// Clears the session before anything else can read it, notifies the logout
    /// endpoint (failures are logged), then bootstraps again.
    pub async fn logout(&self) -> Session {
        self.invalidate();
        if let Err(e) = self.inner.transport.post(LOGOUT_PATH).await {
            tracing::warn!(error = %e, "logout endpoint failed");
        }
        self.bootstrap().await
    }

    /// refresh
    ///
    /// Re-runs bootstrap after an external login, a token refresh, or a 401 from a
    /// resource request.
    pub async fn refresh(&self) -> Session {
        self.invalidate();
        self.bootstrap().await
    }
}
