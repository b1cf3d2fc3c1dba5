//! In-process browser fakes shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::host::{
    BrowserHost, CallbackWindow, MessageTarget, Navigator, PopupFeatures, PopupWindow,
    WindowMessage,
};

pub(crate) const ORIGIN: &str = "http://localhost:3000";

#[derive(Default)]
pub(crate) struct FakePopup {
    closed: AtomicBool,
}

impl PopupWindow for FakePopup {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct OpenedPopup {
    pub(crate) url: Url,
    pub(crate) name: String,
    pub(crate) features: PopupFeatures,
}

pub(crate) struct FakeHost {
    origin: String,
    embedded: AtomicBool,
    block_popups: AtomicBool,
    listeners: Mutex<Vec<mpsc::UnboundedSender<WindowMessage>>>,
    navigations: Mutex<Vec<String>>,
    opened: Mutex<Vec<OpenedPopup>>,
    pub(crate) popup: Arc<FakePopup>,
}

impl FakeHost {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::with_origin(ORIGIN))
    }

    pub(crate) fn with_origin(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            embedded: AtomicBool::new(false),
            block_popups: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
            popup: Arc::new(FakePopup::default()),
        }
    }

    pub(crate) fn set_embedded(&self, embedded: bool) {
        self.embedded.store(embedded, Ordering::SeqCst);
    }

    pub(crate) fn set_block_popups(&self, block: bool) {
        self.block_popups.store(block, Ordering::SeqCst);
    }

    /// Dispatch a message to every registered listener.
    pub(crate) fn deliver(&self, origin: &str, data: Value) {
        self.dispatch(WindowMessage {
            origin: origin.to_string(),
            data,
        });
    }

    pub(crate) fn listener_count(&self) -> usize {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }

    fn dispatch(&self, message: WindowMessage) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|tx| tx.send(message.clone()).is_ok());
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub(crate) fn opened(&self) -> std::sync::MutexGuard<'_, Vec<OpenedPopup>> {
        self.opened.lock().unwrap()
    }
}

impl Navigator for FakeHost {
    fn navigate(&self, path: &str) {
        self.navigations.lock().unwrap().push(path.to_string());
    }

    fn is_embedded(&self) -> bool {
        self.embedded.load(Ordering::SeqCst)
    }
}

impl BrowserHost for FakeHost {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn viewport(&self) -> (u32, u32) {
        (1280, 800)
    }

    fn open_popup(
        &self,
        url: &Url,
        name: &str,
        features: &PopupFeatures,
    ) -> Option<Arc<dyn PopupWindow>> {
        if self.block_popups.load(Ordering::SeqCst) {
            return None;
        }
        self.opened.lock().unwrap().push(OpenedPopup {
            url: url.clone(),
            name: name.to_string(),
            features: *features,
        });
        Some(self.popup.clone())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<WindowMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().push(tx);
        rx
    }
}

impl MessageTarget for FakeHost {
    fn post_message(&self, message: WindowMessage, target_origin: &str) {
        if target_origin == self.origin {
            self.dispatch(message);
        }
    }
}

pub(crate) struct FakeCallbackWindow {
    pub(crate) origin: String,
    pub(crate) fragment: String,
    pub(crate) opener: Option<Arc<dyn MessageTarget>>,
    pub(crate) closed: AtomicBool,
    pub(crate) navigations: Mutex<Vec<String>>,
}

impl FakeCallbackWindow {
    pub(crate) fn new(fragment: &str, opener: Option<Arc<dyn MessageTarget>>) -> Self {
        Self {
            origin: ORIGIN.to_string(),
            fragment: fragment.to_string(),
            opener,
            closed: AtomicBool::new(false),
            navigations: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Navigator for FakeCallbackWindow {
    fn navigate(&self, path: &str) {
        self.navigations.lock().unwrap().push(path.to_string());
    }

    fn is_embedded(&self) -> bool {
        false
    }
}

impl CallbackWindow for FakeCallbackWindow {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn fragment(&self) -> String {
        self.fragment.clone()
    }

    fn opener(&self) -> Option<Arc<dyn MessageTarget>> {
        self.opener.clone()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
