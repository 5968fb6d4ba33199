//! Email/password authentication against the backend's auth service.
//!
//! [`AuthClient`] owns the current session. Every change to it (sign-in,
//! refresh, sign-out, a refresh token being rejected) is pushed to the shared
//! [`ApiClient`] so later requests carry the right bearer token, and is
//! broadcast as a [`SessionEvent`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use larder_core::validation::{validate_credentials, validate_email, validate_new_password};
use larder_core::{
    AuthError, AuthProvider, LarderError, LarderResult, Session, SessionEvent, SignUpOutcome, User,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::api_client::{ApiClient, ErrorContext};
use crate::config::RefreshConfig;

const AUTH_PREFIX: &str = "/auth/v1";
const EVENT_CAPACITY: usize = 64;

/// Token grant as returned by the auth service.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up either signs the user in or answers with the bare user while a
/// confirmation email is pending.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    Pending { user: User },
    User(User),
}

#[derive(Clone)]
pub struct AuthClient {
    api: ApiClient,
    session: Arc<Mutex<Option<Session>>>,
    events: broadcast::Sender<SessionEvent>,
    password_reset_redirect: Option<String>,
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("user_id", &self.current_user_id())
            .finish_non_exhaustive()
    }
}

impl AuthClient {
    pub fn new(api: ApiClient, password_reset_redirect: Option<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            session: Arc::new(Mutex::new(None)),
            events,
            password_reset_redirect,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Session held right now, without refreshing it.
    pub fn session_snapshot(&self) -> Option<Session> {
        self.lock().clone()
    }

    pub fn current_user_id(&self) -> Option<larder_core::UserId> {
        self.lock().as_ref().map(|s| s.user_id().clone())
    }

    /// Adopt a session obtained elsewhere, e.g. one persisted by the caller.
    pub fn restore_session(&self, session: Session) {
        self.replace_session(Some(session));
    }

    fn replace_session(&self, next: Option<Session>) {
        let previous = {
            let mut guard = self.lock();
            std::mem::replace(&mut *guard, next.clone())
        };
        self.api
            .set_access_token(next.as_ref().map(|s| s.access_token.clone()));

        let event = SessionEvent {
            previous_user_id: previous.map(|s| s.user.id),
            session: next,
        };
        tracing::info!(
            previous = ?event.previous_user_id,
            next = ?event.next_user_id(),
            identity_changed = event.identity_changed(),
            "Session changed"
        );
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> LarderResult<Session> {
        let request = self
            .api
            .request(Method::POST, &format!("{AUTH_PREFIX}/token"))
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let token: TokenResponse = self.api.send_json(request, &ErrorContext::Auth).await?;
        Ok(token.into_session())
    }

    /// Exchange the refresh token for a new session.
    ///
    /// A rejected refresh token ends the session.
    pub async fn refresh_session(&self) -> LarderResult<Session> {
        let refresh_token = self
            .lock()
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(AuthError::NotSignedIn)?;

        match self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(session) => {
                tracing::debug!(user_id = %session.user_id(), "Session refreshed");
                self.replace_session(Some(session.clone()));
                Ok(session)
            }
            Err(LarderError::Auth(err)) => {
                tracing::warn!(error = %err, "Refresh token rejected, signing out");
                self.replace_session(None);
                Err(AuthError::SessionExpired.into())
            }
            Err(err) => Err(err),
        }
    }

    /// How long until the session should be refreshed. `None` when there is
    /// nothing to refresh.
    fn refresh_due_in(&self, margin: Duration) -> Option<Duration> {
        let expires_at = self.lock().as_ref()?.expires_at?;
        let due = expires_at - chrono::Duration::from_std(margin).ok()?;
        Some((due - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Keep the session fresh in the background.
    ///
    /// Refreshes `margin` before expiry; failed refreshes are retried with
    /// backoff. The returned handle stops the task when dropped.
    pub fn spawn_auto_refresh(&self, config: RefreshConfig) -> AutoRefresh {
        let auth = self.clone();
        let mut events = self.events.subscribe();

        let handle = tokio::spawn(async move {
            let mut backoff_ms = config.initial_ms;
            let mut retry_in: Option<Duration> = None;
            loop {
                let wait = retry_in.take().or_else(|| auth.refresh_due_in(config.margin()));
                let Some(wait) = wait else {
                    // Signed out or no expiry: sleep until the session changes.
                    match events.recv().await {
                        Ok(_) | Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    event = events.recv() => {
                        if matches!(event, Err(RecvError::Closed)) {
                            break;
                        }
                        continue;
                    }
                }

                match auth.refresh_session().await {
                    Ok(_) => backoff_ms = config.initial_ms,
                    Err(err) if err.requires_sign_in() => backoff_ms = config.initial_ms,
                    Err(err) => {
                        let delay = jittered_backoff(backoff_ms, config.jitter_ms);
                        tracing::warn!(error = %err, retry_ms = delay, "Session refresh failed");
                        retry_in = Some(Duration::from_millis(delay));
                        let next = (backoff_ms as f64 * config.multiplier) as u64;
                        backoff_ms = next.min(config.max_ms);
                    }
                }
            }
        });

        AutoRefresh {
            handle: Some(handle),
        }
    }
}

fn jittered_backoff(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    base_ms.saturating_add(nanos % jitter_ms)
}

/// Background refresh task. Dropping it stops the task.
#[derive(Debug)]
pub struct AutoRefresh {
    handle: Option<JoinHandle<()>>,
}

impl AutoRefresh {
    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

#[async_trait]
impl AuthProvider for AuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> LarderResult<Session> {
        validate_credentials(email, password)?;
        let session = self
            .token_grant(
                "password",
                json!({ "email": email.trim(), "password": password }),
            )
            .await?;
        tracing::info!(user_id = %session.user_id(), "Signed in");
        self.replace_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> LarderResult<SignUpOutcome> {
        validate_credentials(email, password)?;
        let request = self
            .api
            .request(Method::POST, &format!("{AUTH_PREFIX}/signup"))
            .json(&json!({ "email": email.trim(), "password": password }));
        let response: SignUpResponse = self.api.send_json(request, &ErrorContext::Auth).await?;

        match response {
            SignUpResponse::Session(token) => {
                let session = token.into_session();
                self.replace_session(Some(session.clone()));
                Ok(SignUpOutcome::SignedIn(session))
            }
            SignUpResponse::Pending { user } | SignUpResponse::User(user) => {
                tracing::info!(user_id = %user.id, "Sign-up awaiting email confirmation");
                Ok(SignUpOutcome::ConfirmationSent { user })
            }
        }
    }

    async fn sign_out(&self) -> LarderResult<()> {
        let Some(session) = self.session_snapshot() else {
            return Ok(());
        };
        let request = self.api.request_with_token(
            Method::POST,
            &format!("{AUTH_PREFIX}/logout"),
            &session.access_token,
        );
        let remote = self.api.send(request, &ErrorContext::Auth).await;
        self.replace_session(None);

        match remote {
            Ok(_) => Ok(()),
            // The token was already dead server-side.
            Err(LarderError::Auth(_)) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "Remote sign-out failed, local session cleared");
                Err(err)
            }
        }
    }

    async fn reset_password_for_email(&self, email: &str) -> LarderResult<()> {
        validate_email(email)?;
        let mut request = self
            .api
            .request(Method::POST, &format!("{AUTH_PREFIX}/recover"))
            .json(&json!({ "email": email.trim() }));
        if let Some(redirect) = &self.password_reset_redirect {
            request = request.query(&[("redirect_to", redirect.as_str())]);
        }
        self.api.send(request, &ErrorContext::Auth).await?;
        tracing::info!("Password reset email requested");
        Ok(())
    }

    async fn update_password(&self, password: &str) -> LarderResult<()> {
        validate_new_password(password, password)?;
        let session = self.current_session().await?.ok_or(AuthError::NotSignedIn)?;
        let request = self
            .api
            .request_with_token(Method::PUT, &format!("{AUTH_PREFIX}/user"), &session.access_token)
            .json(&json!({ "password": password }));
        self.api.send(request, &ErrorContext::Auth).await?;
        tracing::info!(user_id = %session.user_id(), "Password updated");
        Ok(())
    }

    async fn current_session(&self) -> LarderResult<Option<Session>> {
        let Some(session) = self.session_snapshot() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }
        self.refresh_session().await.map(Some)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::UserId;

    #[test]
    fn test_token_response_expiry() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "refresh_token": "rt",
            "user": { "id": "u1", "email": "a@example.com", "role": "authenticated" }
        }))
        .unwrap();
        let session = token.into_session();
        assert_eq!(session.user.id, UserId::from("u1"));
        assert_eq!(
            session.expires_at,
            DateTime::<Utc>::from_timestamp(1_900_000_000, 0)
        );
    }

    #[test]
    fn test_sign_up_response_shapes() {
        let pending: SignUpResponse = serde_json::from_value(json!({
            "id": "u1",
            "email": "a@example.com",
            "confirmation_sent_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(matches!(pending, SignUpResponse::User(_)));

        let signed_in: SignUpResponse = serde_json::from_value(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "user": { "id": "u1", "email": null }
        }))
        .unwrap();
        assert!(matches!(signed_in, SignUpResponse::Session(_)));
    }

    #[test]
    fn test_jittered_backoff_bounds() {
        assert_eq!(jittered_backoff(100, 0), 100);
        let delay = jittered_backoff(100, 50);
        assert!((100..150).contains(&delay));
    }
}
