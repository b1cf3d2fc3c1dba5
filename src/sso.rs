//! Silent sign-in for embedded hosts (e.g. a Teams tab).
//!
//! The host hands out an identity token which the backend exchanges for a
//! regular session, so no popup is involved.

use std::future::Future;

use crate::api::OkrApi;
use crate::error::Error;
use crate::session::SessionContext;
use crate::types::{Session, UserProfile};

/// Host-provided single sign-on token.
///
/// # Example
///
/// ```rust,ignore
/// impl SsoTokenSource for TeamsBridge {
///     async fn acquire_token(&self) -> Result<String, okrtree_auth::Error> {
///         self.get_auth_token(&["https://graph.microsoft.com"])
///             .await
///             .map_err(|e| okrtree_auth::Error::Sso(e.to_string()))
///     }
/// }
/// ```
pub trait SsoTokenSource: Send + Sync {
    /// Obtain a token for the signed-in host user.
    fn acquire_token(&self) -> impl Future<Output = Result<String, Error>> + Send;
}

pub struct SsoAuthenticator<S> {
    source: S,
    api: OkrApi,
}

impl<S: SsoTokenSource> SsoAuthenticator<S> {
    #[must_use]
    pub fn new(source: S, api: OkrApi) -> Self {
        Self { source, api }
    }

    #[must_use]
    pub fn api(&self) -> &OkrApi {
        &self.api
    }

    fn session(&self) -> &SessionContext {
        self.api.client().session()
    }

    /// Exchange a host token for a backend session and store it.
    ///
    /// # Errors
    ///
    /// - [`Error::Sso`] if the host yields no token.
    /// - Any error from the bootstrap endpoint, or a storage failure.
    pub async fn login(&self) -> Result<UserProfile, Error> {
        let token = self.source.acquire_token().await?;
        if token.is_empty() {
            return Err(Error::Sso("failed to obtain SSO token".into()));
        }

        let session = Session::from(self.api.bootstrap_session(&token).await?);
        self.session().establish(&session)?;
        Ok(session.user)
    }

    /// Stored user if already signed in, otherwise a fresh [`login`](Self::login).
    /// Failures are logged and read as `None`.
    pub async fn ensure_authenticated(&self) -> Option<UserProfile> {
        if let Some(session) = self.session().session() {
            return Some(session.user);
        }

        match self.login().await {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::error!(error = %e, "SSO authentication failed");
                None
            }
        }
    }

    /// Refresh the access token. A failed refresh clears the session.
    pub async fn refresh(&self) -> bool {
        self.api.client().refresh_session().await.is_ok()
    }

    /// Clear tokens and profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the store cannot be written.
    pub fn logout(&self) -> Result<(), Error> {
        self.session().logout()
    }
}
