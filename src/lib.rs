#![doc = include_str!("../README.md")]

pub mod api;
pub mod config;
pub mod error;
pub mod host;
pub mod http;
#[cfg(feature = "popup")]
pub mod popup;
pub mod session;
#[cfg(feature = "sso")]
pub mod sso;
pub mod storage;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use api::{Credentials, OkrApi, TaskChallenge};
pub use config::ClientConfig;
pub use error::Error;
pub use host::{BrowserHost, CallbackWindow, MessageTarget, Navigator, PopupWindow, WindowMessage};
pub use http::{ApiRequest, AuthenticatedHttpClient, RetryPolicy, with_backoff};
#[cfg(feature = "popup")]
pub use popup::{AuthMessage, AuthPopupController, CallbackPage, PendingLogin};
pub use session::SessionContext;
#[cfg(feature = "sso")]
pub use sso::{SsoAuthenticator, SsoTokenSource};
pub use storage::{FileStore, KeyValueStore, MemoryStore, TokenStore};
pub use types::{AccessToken, RefreshToken, Session, UserProfile};
