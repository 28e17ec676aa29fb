use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::header::COOKIE;
use axum::middleware::Next;
use axum::response::Response;
use tower_sessions::Session;
use tower_sessions::cookie::Cookie;
use tower_sessions::session::Error as SessionError;
use tracing::trace;

use crate::{LOG_TARGET, SharedState};

pub const SESSION_COOKIE_NAME: &str = "session";
pub const AUTHENTICATED_USER_ID_KEY: &str = "authenticatedUserID";
pub const FLASH_KEY: &str = "flash";
pub const CSRF_TOKEN_KEY: &str = "csrf_token";

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Application-level view of a session.
#[async_trait]
pub trait SessionExt {
    /// Presence of the user id key only. Not re-checked against storage.
    async fn is_authenticated(&self) -> SessionResult<bool>;
    async fn authenticated_user_id(&self) -> SessionResult<Option<u64>>;

    /// Rotate the session id, then mark the session as signed in.
    async fn log_in(&self, user_id: u64) -> SessionResult<()>;

    /// Rotate the session id, drop the signed-in marker, leave a notice.
    async fn log_out(&self, flash: &str) -> SessionResult<()>;

    async fn set_flash(&self, message: &str) -> SessionResult<()>;

    /// Read and clear the pending notice.
    async fn pop_flash(&self) -> SessionResult<Option<String>>;
}

#[async_trait]
impl SessionExt for Session {
    async fn is_authenticated(&self) -> SessionResult<bool> {
        Ok(self.authenticated_user_id().await?.is_some())
    }

    async fn authenticated_user_id(&self) -> SessionResult<Option<u64>> {
        self.get(AUTHENTICATED_USER_ID_KEY).await
    }

    async fn log_in(&self, user_id: u64) -> SessionResult<()> {
        self.cycle_id().await?;
        self.insert(AUTHENTICATED_USER_ID_KEY, user_id).await
    }

    async fn log_out(&self, flash: &str) -> SessionResult<()> {
        self.cycle_id().await?;
        self.remove::<u64>(AUTHENTICATED_USER_ID_KEY).await?;
        self.set_flash(flash).await
    }

    async fn set_flash(&self, message: &str) -> SessionResult<()> {
        self.insert(FLASH_KEY, message).await
    }

    async fn pop_flash(&self) -> SessionResult<Option<String>> {
        self.remove(FLASH_KEY).await
    }
}

/// One async mutex per session token currently in use.
///
/// Requests carrying the same token run one at a time, from before the
/// session is loaded until after it is saved. Requests without a token, or
/// with different tokens, never wait on each other.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

pub struct SessionLockGuard<'a> {
    locks: &'a SessionLocks,
    token: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

impl SessionLocks {
    pub async fn acquire(&self, token: &str) -> SessionLockGuard<'_> {
        let lock = self
            .locks
            .lock()
            .expect("Locking failed")
            .entry(token.to_owned())
            .or_default()
            .clone();

        let guard = lock.clone().lock_owned().await;

        SessionLockGuard {
            locks: self,
            token: token.to_owned(),
            lock,
            _guard: guard,
        }
    }

    /// Number of tokens with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().expect("Locking failed").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SessionLockGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.locks.lock().expect("Locking failed");
        // map entry + our handle + the owned guard; anything above that is a
        // waiter that still needs the entry
        if Arc::strong_count(&self.lock) <= 3 {
            locks.remove(&self.token);
        }
    }
}

/// Value of the session cookie, if the request carries one.
pub fn session_token(req: &Request) -> Option<String> {
    req.headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned())
}

/// Serialize requests sharing a session token. Must wrap the session layer.
pub async fn serialize_session_requests(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(token) = session_token(&req) else {
        return next.run(req).await;
    };

    let _guard = state.session_locks.acquire(&token).await;
    trace!(target: LOG_TARGET, "Session lock acquired");
    next.run(req).await
}
