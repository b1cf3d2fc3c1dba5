//! Logic of the page the identity provider redirects the popup to.

use std::time::Duration;

use super::message::AuthMessage;
use crate::config::ClientConfig;
use crate::host::{CallbackWindow, WindowMessage};

/// Authorization response carried in the callback URL fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a fragment such as `#code=abc&session_state=xyz`.
    #[must_use]
    pub fn from_fragment(fragment: &str) -> Self {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() && !value.is_empty() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

/// What the callback page does once it has read its fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Post to the opener, then close after `close_after`.
    PostToOpener {
        message: AuthMessage,
        close_after: Duration,
    },
    /// Not running in a popup: navigate in place.
    Redirect(String),
    Nothing,
}

pub struct CallbackPage {
    close_delay: Duration,
    error_close_delay: Duration,
    fallback_path: String,
}

impl CallbackPage {
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            close_delay: config.callback_close_delay,
            error_close_delay: config.error_close_delay,
            fallback_path: config.callback_fallback_path.clone(),
        }
    }

    #[must_use]
    pub fn outcome(&self, params: &CallbackParams, has_opener: bool) -> CallbackOutcome {
        if let Some(code) = &params.code {
            if has_opener {
                return CallbackOutcome::PostToOpener {
                    message: AuthMessage::callback(code.clone()),
                    close_after: self.close_delay,
                };
            }
            return CallbackOutcome::Redirect(format!(
                "{}?code={}",
                self.fallback_path,
                urlencoding::encode(code)
            ));
        }

        if let Some(error) = &params.error {
            if has_opener {
                return CallbackOutcome::PostToOpener {
                    message: AuthMessage::error(
                        error.clone(),
                        params.error_description.clone().unwrap_or_default(),
                    ),
                    close_after: self.error_close_delay,
                };
            }
            return CallbackOutcome::Redirect(format!(
                "{}?error={}",
                self.fallback_path,
                urlencoding::encode(error)
            ));
        }

        CallbackOutcome::Nothing
    }

    /// Read the window's fragment and act on it.
    pub async fn complete(&self, window: &dyn CallbackWindow) -> CallbackOutcome {
        let params = CallbackParams::from_fragment(&window.fragment());
        let opener = window.opener();
        let outcome = self.outcome(&params, opener.is_some());

        match (&outcome, opener) {
            (CallbackOutcome::PostToOpener { message, close_after }, Some(opener)) => {
                if let AuthMessage::Error { error, description } = message {
                    tracing::error!(%error, %description, "Authentication error");
                } else {
                    tracing::info!("Auth callback received code, sending to opener window");
                }
                let origin = window.origin();
                opener.post_message(
                    WindowMessage {
                        origin: origin.clone(),
                        data: message.to_json(),
                    },
                    &origin,
                );
                tokio::time::sleep(*close_after).await;
                window.close();
            }
            (CallbackOutcome::Redirect(path), _) => {
                tracing::info!(%path, "No opener window, redirecting in place");
                window.navigate(path);
            }
            _ => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::host::{BrowserHost, MessageTarget};
    use crate::testing::{FakeCallbackWindow, FakeHost, ORIGIN};

    fn page() -> CallbackPage {
        CallbackPage::new(&ClientConfig::new(ORIGIN.parse().unwrap()))
    }

    #[test]
    fn fragment_is_form_decoded() {
        let params = CallbackParams::from_fragment(
            "#error=access_denied&error_description=User+cancelled&state=1",
        );
        assert_eq!(params.code, None);
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("User cancelled"));

        let params = CallbackParams::from_fragment("code=abc123&session_state=s");
        assert_eq!(params.code.as_deref(), Some("abc123"));
    }

    #[test]
    fn code_with_opener_posts_and_closes_quickly() {
        let params = CallbackParams::from_fragment("#code=abc123");
        assert_eq!(
            page().outcome(&params, true),
            CallbackOutcome::PostToOpener {
                message: AuthMessage::callback("abc123"),
                close_after: Duration::from_millis(500),
            }
        );
    }

    #[test]
    fn error_with_opener_lingers_longer() {
        let params = CallbackParams::from_fragment("#error=access_denied");
        assert_eq!(
            page().outcome(&params, true),
            CallbackOutcome::PostToOpener {
                message: AuthMessage::error("access_denied", ""),
                close_after: Duration::from_millis(2000),
            }
        );
    }

    #[test]
    fn without_opener_redirects_in_place() {
        let page = page();
        assert_eq!(
            page.outcome(&CallbackParams::from_fragment("#code=a/b+c"), false),
            CallbackOutcome::Redirect("/test-auth?code=a%2Fb%20c".into())
        );
        assert_eq!(
            page.outcome(&CallbackParams::from_fragment("#error=access_denied"), false),
            CallbackOutcome::Redirect("/test-auth?error=access_denied".into())
        );
        assert_eq!(
            page.outcome(&CallbackParams::default(), true),
            CallbackOutcome::Nothing
        );
    }

    #[tokio::test(start_paused = true)]
    async fn complete_posts_same_origin_message_then_closes() {
        let host = FakeHost::new();
        let mut messages = host.subscribe();

        let window = FakeCallbackWindow::new(
            "#error=access_denied&error_description=User+cancelled",
            Some(host.clone() as Arc<dyn MessageTarget>),
        );

        let started = tokio::time::Instant::now();
        let outcome = page().complete(&window).await;
        assert!(matches!(outcome, CallbackOutcome::PostToOpener { .. }));
        assert!(window.is_closed());
        assert!(started.elapsed() >= Duration::from_millis(2000));

        let received = messages.try_recv().unwrap();
        assert_eq!(received.origin, ORIGIN);
        assert_eq!(
            received.data,
            json!({"type": "auth-error", "error": "access_denied", "description": "User cancelled"})
        );
    }

    #[tokio::test]
    async fn complete_without_opener_navigates() {
        let window = FakeCallbackWindow::new("#code=abc123", None);
        let outcome = page().complete(&window).await;

        assert_eq!(outcome, CallbackOutcome::Redirect("/test-auth?code=abc123".into()));
        assert_eq!(
            *window.navigations.lock().unwrap(),
            vec!["/test-auth?code=abc123".to_string()]
        );
        assert!(!window.is_closed());
    }
}
