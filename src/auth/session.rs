use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::types::UserId;

use super::{AuthError, IdentityProvider, User};

/// Current-user state. Starts `Unknown` until the provider has answered once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// The provider has not answered yet.
    #[default]
    Unknown,
    /// No user.
    SignedOut,
    /// A user is signed in.
    SignedIn(User),
}

impl AuthState {
    /// `false` only while still `Unknown`.
    pub fn is_known(&self) -> bool {
        !matches!(self, AuthState::Unknown)
    }

    /// The signed-in user, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::SignedIn(user) => Some(user),
            _ => None,
        }
    }
}

/// Shared auth state. Clones observe and update the same state.
///
/// Only `restore`, `sign_in` and `sign_out` change it.
#[derive(Clone)]
pub struct Session {
    state: Arc<watch::Sender<AuthState>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Session in the `Unknown` state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::Unknown);
        Self { state: Arc::new(tx) }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// The signed-in user, if any.
    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    /// Id of the signed-in user.
    pub fn uid(&self) -> Option<UserId> {
        self.state.borrow().user().map(|u| u.uid.clone())
    }

    /// Auth state stream; starts with the current value.
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Waits until the state is no longer `Unknown`.
    pub async fn known(&self) -> AuthState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(AuthState::is_known).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Resolves the startup state from the provider's remembered session.
    /// Does nothing once the state is known.
    pub async fn restore<P: IdentityProvider>(&self, provider: &P) -> AuthState {
        if self.state().is_known() {
            return self.state();
        }
        let next = match provider.restore().await {
            Some(user) => {
                info!(uid = %user.uid, "restored previous session");
                AuthState::SignedIn(user)
            }
            None => AuthState::SignedOut,
        };
        self.state.send_replace(next.clone());
        next
    }

    /// On failure the session stays (or becomes) signed out. No retry.
    pub async fn sign_in<P: IdentityProvider>(&self, provider: &P) -> Result<User, AuthError> {
        match provider.sign_in().await {
            Ok(user) => {
                info!(uid = %user.uid, "signed in");
                self.state.send_replace(AuthState::SignedIn(user.clone()));
                Ok(user)
            }
            Err(err) => {
                warn!(error = %err, "sign-in failed");
                self.state.send_if_modified(|state| {
                    if state.is_known() {
                        return false;
                    }
                    *state = AuthState::SignedOut;
                    true
                });
                Err(err)
            }
        }
    }

    /// Signs out at the provider, then publishes `SignedOut`.
    pub async fn sign_out<P: IdentityProvider>(&self, provider: &P) {
        provider.sign_out().await;
        if let Some(user) = self.current_user() {
            info!(uid = %user.uid, "signed out");
        }
        self.state.send_replace(AuthState::SignedOut);
    }
}
