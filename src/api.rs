use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::endpoints;
use crate::error::Error;
use crate::http::{ApiRequest, AuthenticatedHttpClient, RetryPolicy, with_backoff};
use crate::types::{LoginResponse, RefreshResponse, RefreshToken, TokenPair, UserProfile};

/// Username/password credentials for the backend token endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A challenge raised against an OKR task.
///
/// Only the id is typed; the remaining fields pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskChallenge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Typed OKR backend endpoints on top of [`AuthenticatedHttpClient`].
///
/// Errors from business endpoints (e.g. `404`) are logged and returned
/// unchanged.
pub struct OkrApi {
    client: AuthenticatedHttpClient,
    retry: RetryPolicy,
}

impl OkrApi {
    #[must_use]
    pub fn new(client: AuthenticatedHttpClient) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the backoff used by [`login`](Self::login).
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn client(&self) -> &AuthenticatedHttpClient {
        &self.client
    }

    /// True if the backend answers at all with a success status.
    pub async fn check_backend_connection(&self) -> bool {
        match self.client.execute(&ApiRequest::get(endpoints::PING)).await {
            Ok(_) => {
                tracing::info!("Backend connection successful");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Backend connection failed");
                false
            }
        }
    }

    /// Obtain a token pair with username/password, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last [`Error::Network`] once retries are exhausted, or the
    /// first non-transient error.
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair, Error> {
        with_backoff(self.retry, || self.client.post(endpoints::TOKEN, credentials))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Login error"))
    }

    /// Exchange a host-issued SSO token for a backend session.
    pub async fn bootstrap_session(&self, sso_token: &str) -> Result<LoginResponse, Error> {
        self.client
            .post(endpoints::SESSION_BOOTSTRAP, &json!({ "token": sso_token }))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Session bootstrap failed"))
    }

    pub async fn current_user(&self) -> Result<UserProfile, Error> {
        self.client
            .get(endpoints::CURRENT_USER)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Error fetching current user"))
    }

    /// Call the refresh endpoint directly, without touching stored tokens.
    pub async fn refresh_token(&self, refresh: &RefreshToken) -> Result<RefreshResponse, Error> {
        self.client
            .post(endpoints::TOKEN_REFRESH, &json!({ "refresh": refresh.as_str() }))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Token refresh error"))
    }

    pub async fn task_challenges(&self) -> Result<Vec<TaskChallenge>, Error> {
        self.client
            .get(endpoints::TASK_CHALLENGES)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Error fetching task challenges"))
    }

    pub async fn task_challenge(&self, challenge_id: u64) -> Result<TaskChallenge, Error> {
        self.client
            .get(&challenge_path(challenge_id))
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, challenge_id, "Error fetching task challenge");
            })
    }

    pub async fn create_task_challenge(
        &self,
        challenge: &TaskChallenge,
    ) -> Result<TaskChallenge, Error> {
        self.client
            .post(endpoints::TASK_CHALLENGES, challenge)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Error creating task challenge"))
    }

    pub async fn update_task_challenge(
        &self,
        challenge_id: u64,
        challenge: &TaskChallenge,
    ) -> Result<TaskChallenge, Error> {
        self.client
            .put(&challenge_path(challenge_id), challenge)
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, challenge_id, "Error updating task challenge");
            })
    }

    pub async fn delete_task_challenge(&self, challenge_id: u64) -> Result<(), Error> {
        self.client
            .delete(&challenge_path(challenge_id))
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, challenge_id, "Error deleting task challenge");
            })
    }

    pub async fn task_challenges_by_task(&self, task_id: u64) -> Result<Vec<TaskChallenge>, Error> {
        let request = ApiRequest::get(format!("{}by_task/", endpoints::TASK_CHALLENGES))
            .with_query("task_id", task_id.to_string());
        self.client
            .send_json(&request)
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, task_id, "Error fetching challenges for task");
            })
    }

    /// Whether the signed-in user manages anyone. Any failure reads as `false`.
    pub async fn has_team_members(&self) -> bool {
        match self.client.get::<Value>(endpoints::TEAM_MEMBERS).await {
            Ok(Value::Array(members)) => !members.is_empty(),
            Ok(_) => false,
            Err(e) => {
                tracing::error!(error = %e, "Error checking team members");
                false
            }
        }
    }
}

fn challenge_path(challenge_id: u64) -> String {
    format!("{}{challenge_id}/", endpoints::TASK_CHALLENGES)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::ClientConfig;
    use crate::session::SessionContext;
    use crate::storage::TokenStore;
    use crate::testing::{FakeHost, ORIGIN};

    fn api(base_url: &str) -> OkrApi {
        let config = Arc::new(
            ClientConfig::new(ORIGIN.parse().unwrap())
                .with_api_base_url(base_url.parse().unwrap()),
        );
        let session = Arc::new(SessionContext::init(TokenStore::in_memory()));
        let client = AuthenticatedHttpClient::new(config, session, FakeHost::new()).unwrap();
        OkrApi::new(client).with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10)))
    }

    #[tokio::test]
    async fn login_does_not_retry_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .and(body_json(json!({"username": "ada", "password": "wrong"})))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "detail": "No active account found with the given credentials"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = api(&server.uri())
            .login(&Credentials {
                username: "ada".into(),
                password: "wrong".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn login_returns_token_pair() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access": "a", "refresh": "r"})),
            )
            .mount(&server)
            .await;

        let tokens = api(&server.uri())
            .login(&Credentials {
                username: "ada".into(),
                password: "secret".into(),
            })
            .await
            .unwrap();
        assert_eq!(tokens.access.as_str(), "a");
        assert_eq!(tokens.refresh.as_str(), "r");
    }

    #[tokio::test]
    async fn login_retries_until_exhausted_without_response() {
        let err = api("http://127.0.0.1:9")
            .login(&Credentials {
                username: "ada".into(),
                password: "secret".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn challenges_by_task_uses_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/task-challenges/by_task/"))
            .and(query_param("task_id", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "title": "Blocked on data"},
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let challenges = api(&server.uri()).task_challenges_by_task(5).await.unwrap();
        assert_eq!(challenges.len(), 1);
        assert_eq!(challenges[0].id, Some(1));
        assert_eq!(challenges[0].fields.get("title"), Some(&json!("Blocked on data")));
    }

    #[tokio::test]
    async fn create_and_delete_challenge() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/task-challenges/"))
            .and(body_json(json!({"task": 5, "title": "Scope creep"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 12, "task": 5, "title": "Scope creep",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/task-challenges/12/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let api = api(&server.uri());
        let mut draft = TaskChallenge::default();
        draft.fields.insert("task".into(), json!(5));
        draft.fields.insert("title".into(), json!("Scope creep"));

        let created = api.create_task_challenge(&draft).await.unwrap();
        assert_eq!(created.id, Some(12));
        api.delete_task_challenge(12).await.unwrap();
    }

    #[tokio::test]
    async fn missing_challenge_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/task-challenges/404/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = api(&server.uri()).task_challenge(404).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn team_members_presence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/weekly-forms/my_team_members/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 3}])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/weekly-forms/my_team_members/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let api = api(&server.uri());
        assert!(api.has_team_members().await);
        assert!(!api.has_team_members().await);
    }

    #[tokio::test]
    async fn backend_connection_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(api(&server.uri()).check_backend_connection().await);
        assert!(!api("http://127.0.0.1:9").check_backend_connection().await);
    }
}
