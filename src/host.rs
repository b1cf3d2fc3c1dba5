//! Browser seams.
//!
//! The sign-in flow and the API client never touch a window directly; a host
//! (wasm binding, webview shell, test fake) implements these traits.

use std::sync::Arc;

use tokio::sync::mpsc;
use url::Url;

use crate::config::PopupSize;

/// A cross-window message as delivered to a window's `message` listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    /// Serialized origin of the sending window.
    pub origin: String,
    pub data: serde_json::Value,
}

/// Top-level navigation.
pub trait Navigator: Send + Sync {
    /// Navigate the current window to an app path.
    fn navigate(&self, path: &str);

    /// True when running inside another top-level window (`parent != self`),
    /// e.g. as a Teams tab.
    fn is_embedded(&self) -> bool;
}

/// Handle to an opened popup window.
pub trait PopupWindow: Send + Sync {
    fn is_closed(&self) -> bool;

    fn close(&self);
}

/// A window that accepts posted messages (the popup's opener).
pub trait MessageTarget: Send + Sync {
    /// Deliver `message` if this window's origin equals `target_origin`.
    fn post_message(&self, message: WindowMessage, target_origin: &str);
}

/// Window features for `window.open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFeatures {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

impl PopupFeatures {
    /// Features for a popup of `size` centered in a viewport.
    #[must_use]
    pub fn centered(size: PopupSize, viewport_width: u32, viewport_height: u32) -> Self {
        let offset = |outer: u32, inner: u32| i64::from(outer) / 2 - i64::from(inner) / 2;
        Self {
            width: size.width,
            height: size.height,
            left: clamp_i32(offset(viewport_width, size.width)),
            top: clamp_i32(offset(viewport_height, size.height)),
        }
    }
}

fn clamp_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

impl std::fmt::Display for PopupFeatures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "width={},height={},left={},top={}",
            self.width, self.height, self.left, self.top
        )
    }
}

/// The app's own window.
pub trait BrowserHost: Navigator {
    /// Serialized origin of the current window.
    fn origin(&self) -> String;

    /// Inner width and height of the current window.
    fn viewport(&self) -> (u32, u32);

    /// Open a named popup. `None` means the host blocked it.
    fn open_popup(
        &self,
        url: &Url,
        name: &str,
        features: &PopupFeatures,
    ) -> Option<Arc<dyn PopupWindow>>;

    /// Register a `message` listener.
    ///
    /// Every message dispatched after this call is queued for the receiver
    /// until it is read. Dropping the receiver deregisters it; hosts prune
    /// senders whose receiver is gone (`UnboundedSender::is_closed`).
    fn subscribe(&self) -> mpsc::UnboundedReceiver<WindowMessage>;
}

/// The popup's own window, as seen by the callback page.
pub trait CallbackWindow: Navigator {
    fn origin(&self) -> String;

    /// URL fragment, with or without the leading `#`.
    fn fragment(&self) -> String;

    /// The window that opened this one, if any.
    fn opener(&self) -> Option<Arc<dyn MessageTarget>>;

    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popup_is_centered_in_viewport() {
        let size = PopupSize {
            width: 600,
            height: 600,
        };
        let features = PopupFeatures::centered(size, 1280, 800);
        assert_eq!(features.to_string(), "width=600,height=600,left=340,top=100");
    }

    #[test]
    fn small_viewport_gives_negative_offsets() {
        let size = PopupSize {
            width: 600,
            height: 600,
        };
        let features = PopupFeatures::centered(size, 400, 300);
        assert_eq!(features.left, -100);
        assert_eq!(features.top, -150);
    }
}
