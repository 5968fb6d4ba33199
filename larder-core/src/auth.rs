//! Authentication provider contract.
//!
//! The provider is an external service; this module only fixes the shape of
//! sessions, the change events it emits, and the operations callers rely on.

use crate::{LarderResult, Timestamp, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Authenticated user as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
}

/// An active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<Timestamp>,
    pub user: User,
}

impl Session {
    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }

    /// Returns true if the access token has passed its expiry.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Emitted whenever the provider's session changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// User id observed before this change, if any.
    pub previous_user_id: Option<UserId>,
    /// Session after this change; `None` when signed out.
    pub session: Option<Session>,
}

impl SessionEvent {
    /// User id after this change, if signed in.
    pub fn next_user_id(&self) -> Option<&UserId> {
        self.session.as_ref().map(Session::user_id)
    }

    /// Returns true if the authenticated identity differs across this event.
    pub fn identity_changed(&self) -> bool {
        self.previous_user_id.as_ref() != self.next_user_id()
    }
}

/// Outcome of a sign-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The provider signed the user in immediately.
    SignedIn(Session),
    /// The provider sent a confirmation email first.
    ConfirmationSent { user: User },
}

/// Authentication provider operations.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Sign in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> LarderResult<Session>;

    /// Register a new account.
    async fn sign_up(&self, email: &str, password: &str) -> LarderResult<SignUpOutcome>;

    /// End the current session.
    async fn sign_out(&self) -> LarderResult<()>;

    /// Send a password reset email.
    async fn reset_password_for_email(&self, email: &str) -> LarderResult<()>;

    /// Change the signed-in user's password.
    async fn update_password(&self, password: &str) -> LarderResult<()>;

    /// Current session, if any.
    async fn current_session(&self) -> LarderResult<Option<Session>>;

    /// Subscribe to session change events.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}
