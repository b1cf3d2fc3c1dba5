//! Popup sign-in against the Microsoft identity platform.
//!
//! [`AuthPopupController`] runs in the app window; [`CallbackPage`] runs in
//! the popup once the provider redirects back. They talk through
//! same-origin [`AuthMessage`]s.

mod callback;
mod controller;
mod message;

pub use callback::{CallbackOutcome, CallbackPage, CallbackParams};
pub use controller::{AuthPopupController, PendingLogin};
pub use message::AuthMessage;
