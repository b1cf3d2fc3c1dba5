use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;
use url::Url;

use crate::error::Error;
use crate::session::SessionContext;
use crate::types::{AccessToken, RefreshResponse, RefreshToken};

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// A refresh that did not produce a token.
#[derive(Debug)]
pub(crate) struct RefreshFailure {
    pub(crate) error: Error,
    /// An earlier caller's refresh for the same expiry already failed and
    /// ended the session; this caller must not end it again.
    pub(crate) superseded: bool,
}

/// Serializes token refreshes so that requests racing one expiry share a
/// single refresh call, and a single failure.
pub(crate) struct RefreshCoordinator {
    http: reqwest::Client,
    endpoint: Url,
    gate: Mutex<()>,
    failures: AtomicU64,
}

impl RefreshCoordinator {
    pub(crate) fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            gate: Mutex::new(()),
            failures: AtomicU64::new(0),
        }
    }

    /// Number of failed refreshes so far. Read it before dispatching a request
    /// and pass it to [`refresh`](Self::refresh).
    pub(crate) fn failures(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    /// Obtain a fresh access token and store it.
    ///
    /// `rejected` is the token the failed request carried. If storage already
    /// holds a different access token, a concurrent refresh has replaced it and
    /// that token is returned without calling the endpoint. Pass `None` to
    /// always refresh.
    ///
    /// `seen_failures` is [`failures`](Self::failures) as read by the caller.
    /// If a refresh has failed since then, the caller is told it was
    /// superseded and the endpoint is not called.
    pub(crate) async fn refresh(
        &self,
        session: &SessionContext,
        rejected: Option<&AccessToken>,
        seen_failures: u64,
    ) -> Result<AccessToken, RefreshFailure> {
        let _guard = self.gate.lock().await;

        if let (Some(rejected), Some(current)) = (rejected, session.store().access_token()) {
            if &current != rejected {
                tracing::debug!("Access token already refreshed by a concurrent request");
                return Ok(current);
            }
        }

        if self.failures() != seen_failures {
            tracing::debug!("Token refresh already failed for a concurrent request");
            return Err(RefreshFailure {
                error: Error::Refresh("session ended by a concurrent refresh failure".into()),
                superseded: true,
            });
        }

        self.attempt(session).await.map_err(|error| {
            self.failures.fetch_add(1, Ordering::AcqRel);
            RefreshFailure {
                error,
                superseded: false,
            }
        })
    }

    async fn attempt(&self, session: &SessionContext) -> Result<AccessToken, Error> {
        let refresh = session
            .store()
            .refresh_token()
            .ok_or_else(|| Error::Refresh("no refresh token stored".into()))?;
        let access = self.request(&refresh).await?;
        session.set_access_token(&access)?;

        tracing::info!("Access token refreshed");
        Ok(access)
    }

    async fn request(&self, refresh: &RefreshToken) -> Result<AccessToken, Error> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&RefreshRequest {
                refresh: refresh.as_str(),
            })
            .send()
            .await
            .map_err(|e| Error::Refresh(format!("network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Refresh(format!("HTTP {status}: {body}")));
        }

        response
            .json::<RefreshResponse>()
            .await
            .map(|r| r.access)
            .map_err(|e| Error::Refresh(format!("invalid response: {e}")))
    }
}
