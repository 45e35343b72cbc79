//! Session lifecycle for authenticated remote backends.
//!
//! ```text
//! Unauthenticated -> Authenticating -> Authenticated
//!                         ^                  |
//!                         +---- Expired <----+  (API call answered with an auth error)
//! ```
//!
//! An expired session is re-authenticated once per call. If the retried call
//! fails authentication again the error is returned to the caller.

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::app::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Expired,
}

/// Produces a fresh session token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self) -> Result<String>;
}

struct Inner {
    state: SessionState,
    token: Option<String>,
}

pub struct Session {
    inner: Mutex<Inner>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Unauthenticated,
                token: None,
            }),
        }
    }

    /// Start from a token obtained earlier (e.g. persisted in config).
    pub fn with_token(token: String) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Authenticated,
                token: Some(token),
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Current token, authenticating first if there is none.
    pub async fn token<A: Authenticator + ?Sized>(&self, auth: &A) -> Result<String> {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Authenticated {
            if let Some(token) = &inner.token {
                return Ok(token.clone());
            }
        }

        inner.state = SessionState::Authenticating;
        match auth.authenticate().await {
            Ok(token) => {
                inner.state = SessionState::Authenticated;
                inner.token = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                inner.state = SessionState::Unauthenticated;
                inner.token = None;
                Err(e)
            }
        }
    }

    /// Mark `stale` as expired unless another caller already replaced it.
    async fn expire(&self, stale: &str) {
        let mut inner = self.inner.lock().await;
        if inner.token.as_deref() == Some(stale) {
            inner.state = SessionState::Expired;
            inner.token = None;
        }
    }

    /// Run `op` with a valid token, re-authenticating once on an auth error.
    pub async fn call<A, T, F, Fut>(&self, auth: &A, op: F) -> Result<T>
    where
        A: Authenticator + ?Sized,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self.token(auth).await?;
        match op(token.clone()).await {
            Err(e) if e.is_auth() => {
                tracing::info!("Session expired ({}), re-authenticating", e);
                self.expire(&token).await;

                let token = self.token(auth).await?;
                match op(token.clone()).await {
                    Err(e) if e.is_auth() => {
                        self.expire(&token).await;
                        Err(e)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }
}
