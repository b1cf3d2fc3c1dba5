use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::refresh::RefreshCoordinator;
use crate::config::{ClientConfig, endpoints};
use crate::error::Error;
use crate::host::Navigator;
use crate::session::SessionContext;
use crate::types::AccessToken;

/// One logical API call. Kept separate from `reqwest::Request` so it can be
/// dispatched again after a token refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if `body` does not serialize.
    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, Error> {
        self.body = Some(serde_json::to_value(body).map_err(Error::Encode)?);
        Ok(self)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Backend client that attaches the stored bearer token and recovers from an
/// expired one.
///
/// A `401` triggers one refresh (shared with any concurrent request hitting
/// the same expiry) and one replay. When no refresh is possible the session
/// is cleared and, unless embedded in another window, the host navigates to
/// the login page. The caller then sees the original `401`.
pub struct AuthenticatedHttpClient {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
    session: Arc<SessionContext>,
    navigator: Arc<dyn Navigator>,
    refresher: RefreshCoordinator,
}

impl AuthenticatedHttpClient {
    /// Create a client with a default `reqwest` client (JSON content type,
    /// configured request timeout).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built or the
    /// refresh endpoint URL is invalid.
    pub fn new(
        config: Arc<ClientConfig>,
        session: Arc<SessionContext>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, Error> {
        let http = build_http_client(&config)?;
        Self::with_http_client(config, session, navigator, http)
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the refresh endpoint URL is invalid.
    pub fn with_http_client(
        config: Arc<ClientConfig>,
        session: Arc<SessionContext>,
        navigator: Arc<dyn Navigator>,
        http: reqwest::Client,
    ) -> Result<Self, Error> {
        let refresher =
            RefreshCoordinator::new(http.clone(), config.endpoint(endpoints::TOKEN_REFRESH)?);
        Ok(Self {
            config,
            http,
            session,
            navigator,
            refresher,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Send `request`, refreshing and replaying once on `401`.
    ///
    /// # Errors
    ///
    /// - [`Error::Network`] if no response was received.
    /// - [`Error::Status`] for any non-success response, including a `401`
    ///   that survived the refresh-and-replay.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Response, Error> {
        let url = self.url_for(request)?;
        let sent = self.session.store().bearer_token();
        let seen_failures = self.refresher.failures();

        tracing::debug!(method = %request.method, %url, "Dispatching request");
        let response = self.dispatch(request, &url, sent.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return ensure_success(response, &url).await;
        }

        tracing::debug!(%url, "Unauthorized, refreshing access token");
        match self
            .refresher
            .refresh(&self.session, sent.as_ref(), seen_failures)
            .await
        {
            Ok(token) => {
                let replay = self.dispatch(request, &url, Some(&token)).await?;
                ensure_success(replay, &url).await
            }
            Err(failure) => {
                if !failure.superseded {
                    tracing::warn!(
                        error = %failure.error,
                        "Token refresh failed, sign-in required"
                    );
                    self.end_session();
                }
                ensure_success(response, &url).await
            }
        }
    }

    /// Send `request` and decode a JSON response body.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus [`Error::Decode`] for a body that
    /// does not match `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, Error> {
        let response = self.execute(request).await?;
        let url = response.url().to_string();
        response.json::<T>().await.map_err(|e| Error::decode(url, e))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.send_json(&ApiRequest::get(path)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(&ApiRequest::post(path).with_json(body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(&ApiRequest::put(path).with_json(body)?).await
    }

    /// Send a `DELETE`, discarding any response body.
    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        self.execute(&ApiRequest::delete(path)).await.map(drop)
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// On failure the session is cleared (no navigation).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Refresh`] if no refresh token is stored or the
    /// endpoint rejects it.
    pub async fn refresh_session(&self) -> Result<AccessToken, Error> {
        let seen_failures = self.refresher.failures();
        match self.refresher.refresh(&self.session, None, seen_failures).await {
            Ok(token) => Ok(token),
            Err(failure) => {
                if !failure.superseded {
                    tracing::warn!(error = %failure.error, "Token refresh failed");
                    self.session.teardown();
                }
                Err(failure.error)
            }
        }
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, Error> {
        let mut url = self.config.endpoint(&request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        url: &Url,
        token: Option<&AccessToken>,
    ) -> Result<Response, Error> {
        let mut builder = self.http.request(request.method.clone(), url.clone());
        if let Some(token) = token {
            builder = builder.bearer_auth(token.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|e| {
            tracing::error!(
                %url,
                error = %e,
                "No response received from server. Is the backend running?"
            );
            Error::network(url.as_str(), e)
        })
    }

    fn end_session(&self) {
        self.session.teardown();
        if self.navigator.is_embedded() {
            tracing::info!("Embedded in another window, leaving re-authentication to the host");
        } else {
            self.navigator.navigate(&self.config.login_path);
        }
    }
}

fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| Error::Config(format!("HTTP client: {e}")))
}

/// Checks HTTP response status; returns the response on success or an error with details.
async fn ensure_success(response: Response, url: &Url) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    tracing::error!(%url, %status, %detail, "API error response");
    Err(Error::Status {
        url: url.to_string(),
        status,
        detail,
    })
}
