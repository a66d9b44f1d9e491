//! Identity gate: the engines' view of authentication state.
//!
//! The identity provider resolves its initial session asynchronously, so at
//! engine startup the state may still be unknown. Rather than polling the
//! provider on a fixed interval, the gate is a resolve-once watch channel:
//! the auth layer holds an [`IdentityHandle`] and publishes state changes,
//! while engines hold a cheap clonable [`IdentityGate`] and await the first
//! resolved state with a bounded budget.
//!
//! If the budget expires before the provider resolves, the gate fails open
//! to [`SessionState::Anonymous`]: startup latency stays bounded at the
//! configured budget, at the accepted cost that a login completing just
//! after the deadline is picked up only on the next page load.

use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use faithline_core::UserId;

/// Authentication state as seen by the engines.
///
/// `Unresolved` is distinct from `Anonymous`: the former means the provider
/// has not answered yet, the latter is a definitive "no session".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// The identity provider has not resolved the initial session yet.
    #[default]
    Unresolved,
    /// No authenticated session.
    Anonymous,
    /// An authenticated session for the given user.
    Authenticated(UserId),
}

impl SessionState {
    /// The user ID, if authenticated.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Authenticated(id) => Some(*id),
            _ => None,
        }
    }
}

/// Create a connected handle/gate pair, initially [`SessionState::Unresolved`].
#[must_use]
pub fn channel() -> (IdentityHandle, IdentityGate) {
    let (tx, rx) = watch::channel(SessionState::Unresolved);
    (IdentityHandle { tx }, IdentityGate { rx })
}

/// The identity provider's side of the gate.
///
/// Owned by the auth layer; dropped when the page (process) goes away.
#[derive(Debug)]
pub struct IdentityHandle {
    tx: watch::Sender<SessionState>,
}

impl IdentityHandle {
    /// Publish a new session state. Called for the initial resolution and
    /// for every subsequent sign-in/sign-out transition.
    pub fn set(&self, state: SessionState) {
        // send_replace stores the state even while no gate is subscribed,
        // so a resolution that lands before the engines are built is still
        // observed by gates created afterwards.
        self.tx.send_replace(state);
    }

    /// Resolve the initial session as anonymous.
    pub fn resolve_anonymous(&self) {
        self.set(SessionState::Anonymous);
    }

    /// Resolve the initial session as authenticated.
    pub fn resolve_authenticated(&self, user_id: UserId) {
        self.set(SessionState::Authenticated(user_id));
    }

    /// Create another gate observing this handle.
    #[must_use]
    pub fn gate(&self) -> IdentityGate {
        IdentityGate {
            rx: self.tx.subscribe(),
        }
    }
}

/// The engines' read side of the gate.
#[derive(Debug, Clone)]
pub struct IdentityGate {
    rx: watch::Receiver<SessionState>,
}

impl IdentityGate {
    /// The current session state (may be `Unresolved`).
    #[must_use]
    pub fn current(&self) -> SessionState {
        *self.rx.borrow()
    }

    /// Whether an authenticated session is active right now.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.current(), SessionState::Authenticated(_))
    }

    /// The authenticated user's ID, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.current().user_id()
    }

    /// Wait until the provider publishes a non-`Unresolved` state, up to
    /// `budget`. On timeout (or a dropped provider) fails open to
    /// [`SessionState::Anonymous`].
    pub async fn wait_resolved(&self, budget: Duration) -> SessionState {
        let state = self.current();
        if state != SessionState::Unresolved {
            return state;
        }

        let mut rx = self.rx.clone();
        let resolved = tokio::time::timeout(budget, async {
            loop {
                if rx.changed().await.is_err() {
                    // Provider dropped without resolving.
                    return SessionState::Anonymous;
                }
                let state = *rx.borrow();
                if state != SessionState::Unresolved {
                    return state;
                }
            }
        })
        .await;

        match resolved {
            Ok(state) => state,
            Err(_) => {
                warn!(
                    budget_ms = budget.as_millis() as u64,
                    "identity gate did not resolve within budget, proceeding as guest"
                );
                SessionState::Anonymous
            }
        }
    }

    /// A receiver of subsequent session transitions, for callers that need
    /// to react to sign-in/sign-out while the page is alive.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<SessionState> {
        self.rx.clone()
    }
}
