use tokio::sync::Mutex;

use super::{AuthError, IdentityProvider, User};

/// Provider with a scripted sign-in outcome.
///
/// A successful sign-in is remembered and handed back by `restore` until
/// `sign_out` forgets it.
pub struct FixedIdentityProvider {
    outcome: Result<User, AuthError>,
    remembered: Mutex<Option<User>>,
}

impl FixedIdentityProvider {
    /// Provider whose sign-in succeeds as `user`.
    pub fn accepting(user: User) -> Self {
        Self {
            outcome: Ok(user),
            remembered: Mutex::new(None),
        }
    }

    /// Provider whose sign-in always fails with `err`.
    pub fn rejecting(err: AuthError) -> Self {
        Self {
            outcome: Err(err),
            remembered: Mutex::new(None),
        }
    }

    /// Provider that already holds a session for `user`.
    pub fn remembering(user: User) -> Self {
        Self {
            outcome: Ok(user.clone()),
            remembered: Mutex::new(Some(user)),
        }
    }
}

impl IdentityProvider for FixedIdentityProvider {
    async fn sign_in(&self) -> Result<User, AuthError> {
        let user = self.outcome.clone()?;
        *self.remembered.lock().await = Some(user.clone());
        Ok(user)
    }

    async fn restore(&self) -> Option<User> {
        self.remembered.lock().await.clone()
    }

    async fn sign_out(&self) {
        *self.remembered.lock().await = None;
    }
}
