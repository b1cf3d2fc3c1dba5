use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

use super::message::{AuthMessage, Disposition};
use crate::config::{ClientConfig, endpoints};
use crate::error::Error;
use crate::host::{BrowserHost, PopupFeatures, PopupWindow, WindowMessage};
use crate::session::SessionContext;
use crate::types::{AuthCode, LoginResponse, Session, UserProfile};

const POPUP_NAME: &str = "microsoft-auth-popup";

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    code: &'a str,
    redirect_uri: &'a str,
}

/// Drives the Microsoft popup sign-in.
///
/// ```rust,ignore
/// let controller = AuthPopupController::new(config, host, session);
/// match controller.login()?.await {
///     Ok(user) => println!("Welcome, {}", user.display_name()),
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
pub struct AuthPopupController {
    config: Arc<ClientConfig>,
    host: Arc<dyn BrowserHost>,
    session: Arc<SessionContext>,
    http: reqwest::Client,
}

impl AuthPopupController {
    #[must_use]
    pub fn new(
        config: Arc<ClientConfig>,
        host: Arc<dyn BrowserHost>,
        session: Arc<SessionContext>,
    ) -> Self {
        Self {
            config,
            host,
            session,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client for the code exchange.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Authorize URL opened in the popup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured tenant does not form a URL.
    pub fn authorization_url(&self) -> Result<Url, Error> {
        let mut url = self.config.authorize_endpoint()?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("response_mode", "fragment")
            .append_pair("prompt", "select_account");
        Ok(url)
    }

    /// Open the sign-in popup and start listening for its result.
    ///
    /// The message listener is registered and running on its own task before
    /// this returns; await the returned [`PendingLogin`] for the outcome.
    /// Dropping it stops the listener and deregisters it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PopupBlocked`] if the host refuses to open the window,
    /// in which case no listener is registered.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn login(&self) -> Result<PendingLogin, Error> {
        let url = self.authorization_url()?;
        let (viewport_width, viewport_height) = self.host.viewport();
        let features =
            PopupFeatures::centered(self.config.popup_size, viewport_width, viewport_height);

        tracing::debug!(
            client_id = %self.config.client_id,
            tenant_id = %self.config.tenant_id,
            redirect_uri = %self.config.redirect_uri,
            "Opening sign-in popup"
        );

        let Some(popup) = self.host.open_popup(&url, POPUP_NAME, &features) else {
            tracing::warn!("Sign-in popup was blocked");
            return Err(Error::PopupBlocked);
        };

        let listener = Listener {
            config: self.config.clone(),
            host: self.host.clone(),
            session: self.session.clone(),
            http: self.http.clone(),
            popup,
            origin: self.host.origin(),
        };
        let messages = self.host.subscribe();

        Ok(PendingLogin {
            task: tokio::spawn(listener.run(messages)),
        })
    }
}

/// An in-progress popup sign-in. Resolves to the signed-in user's profile.
#[must_use = "the sign-in result is only observed by awaiting the pending login"]
pub struct PendingLogin {
    task: JoinHandle<Result<UserProfile, Error>>,
}

impl Future for PendingLogin {
    type Output = Result<UserProfile, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::PopupClosed)),
        }
    }
}

impl Drop for PendingLogin {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin").finish_non_exhaustive()
    }
}

struct Listener {
    config: Arc<ClientConfig>,
    host: Arc<dyn BrowserHost>,
    session: Arc<SessionContext>,
    http: reqwest::Client,
    popup: Arc<dyn PopupWindow>,
    origin: String,
}

impl Listener {
    async fn run(
        self,
        mut messages: mpsc::UnboundedReceiver<WindowMessage>,
    ) -> Result<UserProfile, Error> {
        let mut closed_check =
            tokio::time::interval(self.config.popup_poll_interval.max(Duration::from_millis(1)));
        closed_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let timeout = self.config.popup_timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let code = loop {
            tokio::select! {
                biased;

                received = messages.recv() => match received {
                    Some(message) => {
                        if message.origin != self.origin {
                            tracing::debug!(
                                origin = %message.origin,
                                "Ignoring message from different origin"
                            );
                            continue;
                        }
                        match AuthMessage::classify(&message.data) {
                            Disposition::Exchange(code) => break code,
                            Disposition::Fail(e) => {
                                tracing::warn!(error = %e, "Auth error from popup");
                                return Err(e);
                            }
                            Disposition::Ignore => {}
                        }
                    }
                    None => {
                        tracing::warn!("Host stopped dispatching window messages");
                        return Err(Error::PopupClosed);
                    }
                },
                () = &mut deadline => {
                    self.popup.close();
                    let limit = timeout.unwrap_or_default();
                    tracing::warn!(?limit, "Sign-in popup timed out");
                    return Err(Error::PopupTimeout(limit));
                }
                _ = closed_check.tick() => {
                    if self.popup.is_closed() {
                        tracing::info!("Sign-in popup closed before completing");
                        return Err(Error::PopupClosed);
                    }
                }
            }
        };

        // At most one exchange per popup: stop listening before any network work.
        drop(messages);
        self.exchange(code).await
    }

    async fn exchange(&self, code: AuthCode) -> Result<UserProfile, Error> {
        tracing::info!("Received auth code, exchanging for token");
        let response = self.request_exchange(&code).await.map_err(|e| {
            tracing::error!(error = %e, "Error exchanging code for token");
            Error::Exchange(Box::new(e))
        })?;

        let session = Session::from(response);
        if let Err(e) = self.session.establish(&session) {
            tracing::error!(error = %e, "Failed to store session");
            self.session.teardown();
            return Err(Error::Exchange(Box::new(e)));
        }

        if self.config.redirect_to_home {
            self.host.navigate(&self.config.home_path);
        }
        Ok(session.user)
    }

    async fn request_exchange(&self, code: &AuthCode) -> Result<LoginResponse, Error> {
        let url = self.config.endpoint(endpoints::CODE_EXCHANGE)?;
        let response = self
            .http
            .post(url.clone())
            .json(&ExchangeRequest {
                code: code.as_str(),
                redirect_uri: self.config.redirect_uri.as_str(),
            })
            .send()
            .await
            .map_err(|e| Error::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                url: url.to_string(),
                status,
                detail,
            });
        }
        response
            .json::<LoginResponse>()
            .await
            .map_err(|e| Error::decode(url.as_str(), e))
    }
}
