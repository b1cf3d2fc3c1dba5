use crate::error::Error;
use crate::storage::TokenStore;
use crate::types::{AccessToken, Session, UserProfile};

/// Owner of the signed-in session.
///
/// Storage is the source of truth: every read goes to the [`TokenStore`], so a
/// token written by a refresh is visible to the next request immediately.
/// Create one per app at startup and share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SessionContext {
    store: TokenStore,
}

impl SessionContext {
    /// Start the session lifecycle over `store`, picking up any stored session.
    #[must_use]
    pub fn init(store: TokenStore) -> Self {
        let context = Self { store };
        match context.session() {
            Some(session) => tracing::debug!(
                user = %session.user.display_name(),
                "Restored stored session"
            ),
            None => tracing::debug!("No stored session"),
        }
        context
    }

    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Signed in means both an access token and a profile are stored.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.session().is_some()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.store.session()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.store.user()
    }

    /// Persist a newly issued session.
    pub fn establish(&self, session: &Session) -> Result<(), Error> {
        self.store.save_session(session)?;
        tracing::info!(user = %session.user.display_name(), "Session established");
        Ok(())
    }

    /// Replace the access token after a refresh.
    pub fn set_access_token(&self, token: &AccessToken) -> Result<(), Error> {
        self.store.set_access_token(token)
    }

    /// Clear tokens and profile together.
    pub fn logout(&self) -> Result<(), Error> {
        self.store.clear()?;
        tracing::info!("Session cleared");
        Ok(())
    }

    /// Like [`logout`](Self::logout), for failure paths that have no caller
    /// to report a storage error to.
    pub(crate) fn teardown(&self) {
        if let Err(e) = self.logout() {
            tracing::error!(error = %e, "Failed to clear session");
        }
    }
}
