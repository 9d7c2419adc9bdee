//! Identity provider seam and the process-wide auth state.

/// Deterministic provider for tests and local runs.
pub mod provider;
/// Auth state lifecycle shared by every view.
pub mod session;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::types::UserId;

pub use provider::FixedIdentityProvider;
pub use session::{AuthState, Session};

/// Sign-in failures reported by an [`IdentityProvider`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The user closed the sign-in window.
    #[error("sign-in popup was closed before completing")]
    PopupClosed,
    /// The sign-in window could not be opened.
    #[error("sign-in popup was blocked")]
    PopupBlocked,
    /// The provider refused the account.
    #[error("sign-in denied: {0}")]
    Denied(String),
    /// Any other provider failure.
    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable provider id; owner of the user's todos.
    pub uid: UserId,
    /// Name to greet the user with.
    pub display_name: Option<String>,
    /// Account email, if shared.
    pub email: Option<String>,
}

impl User {
    /// User with only an id.
    pub fn new(uid: impl Into<UserId>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
        }
    }
}

/// Federated sign-in service.
pub trait IdentityProvider: Send + Sync {
    /// Interactive sign-in. May be cancelled or refused by the user.
    fn sign_in(&self) -> impl Future<Output = Result<User, AuthError>> + Send;

    /// Session left over from an earlier run, if the provider kept one.
    fn restore(&self) -> impl Future<Output = Option<User>> + Send;

    /// Drops the provider-side session.
    fn sign_out(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}
