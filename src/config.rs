use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Microsoft tenant used when `MICROSOFT_TENANT_ID` is unset.
pub const DEFAULT_TENANT_ID: &str = "0f31460e-8f97-4bf6-9b20-fe837087ad59";
/// App registration used when `MICROSOFT_CLIENT_ID` is unset.
pub const DEFAULT_CLIENT_ID: &str = "4f34222d-3d22-4855-9d70-6aa95971c511";
/// Backend base URL used when `OKR_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
/// Path of the popup callback page, relative to the app origin.
pub const CALLBACK_PATH: &str = "/auth/microsoft-callback";
/// Redirect URI used when the origin cannot carry a path.
const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/auth/microsoft-callback";

/// Backend endpoint paths.
pub mod endpoints {
    pub const PING: &str = "/api/";
    pub const TOKEN: &str = "/api/token/";
    pub const TOKEN_REFRESH: &str = "/api/token/refresh/";
    pub const CODE_EXCHANGE: &str = "/api/auth/microsoft/callback";
    pub const SESSION_BOOTSTRAP: &str = "/api/auth/teams/";
    pub const CURRENT_USER: &str = "/api/auth/me/";
    pub const TASK_CHALLENGES: &str = "/api/task-challenges/";
    pub const TEAM_MEMBERS: &str = "/api/weekly-forms/my_team_members/";
}

/// Pixel size of the sign-in popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupSize {
    pub width: u32,
    pub height: u32,
}

/// Client configuration.
///
/// The app origin is the only required input; the redirect URI is derived
/// from it unless overridden.
///
/// ```rust,ignore
/// let config = ClientConfig::new("https://okr.example.com".parse()?)
///     .with_api_base_url("https://api.okr.example.com".parse()?)
///     .with_redirect_to_home(true);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) origin: String,
    pub(crate) tenant_id: String,
    pub(crate) client_id: String,
    pub(crate) authority: Url,
    pub(crate) api_base_url: Url,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) request_timeout: Duration,
    pub(crate) popup_size: PopupSize,
    pub(crate) popup_timeout: Option<Duration>,
    pub(crate) popup_poll_interval: Duration,
    pub(crate) callback_close_delay: Duration,
    pub(crate) error_close_delay: Duration,
    pub(crate) login_path: String,
    pub(crate) home_path: String,
    pub(crate) callback_fallback_path: String,
    pub(crate) redirect_to_home: bool,
}

impl ClientConfig {
    /// Create a configuration for an app served from `origin`.
    #[must_use]
    pub fn new(origin: Url) -> Self {
        let redirect_uri = origin.join(CALLBACK_PATH).unwrap_or_else(|_| {
            DEFAULT_REDIRECT_URI.parse().expect("valid default URL")
        });
        Self {
            origin: origin.origin().ascii_serialization(),
            tenant_id: DEFAULT_TENANT_ID.into(),
            client_id: DEFAULT_CLIENT_ID.into(),
            authority: "https://login.microsoftonline.com/"
                .parse()
                .expect("valid default URL"),
            api_base_url: DEFAULT_API_URL.parse().expect("valid default URL"),
            redirect_uri,
            scopes: ["openid", "profile", "email", "User.Read"]
                .into_iter()
                .map(String::from)
                .collect(),
            request_timeout: Duration::from_secs(15),
            popup_size: PopupSize {
                width: 600,
                height: 600,
            },
            popup_timeout: Some(Duration::from_secs(300)),
            popup_poll_interval: Duration::from_millis(500),
            callback_close_delay: Duration::from_millis(500),
            error_close_delay: Duration::from_millis(2000),
            login_path: "/login".into(),
            home_path: "/".into(),
            callback_fallback_path: "/test-auth".into(),
            redirect_to_home: false,
        }
    }

    /// Create a configuration from process environment variables.
    ///
    /// # Optional env vars
    /// - `OKR_API_URL`: backend base URL
    /// - `MICROSOFT_TENANT_ID`: identity tenant
    /// - `MICROSOFT_CLIENT_ID`: OAuth2 client ID
    /// - `OKR_REDIRECT_URI`: popup callback URI (defaults to `{origin}/auth/microsoft-callback`)
    /// - `OKR_SCOPES`: comma-separated scopes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a URL variable does not parse.
    pub fn from_env(origin: Url) -> Result<Self, Error> {
        Self::from_lookup(origin, |key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a URL variable does not parse.
    pub fn from_lookup(
        origin: Url,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Error> {
        let mut config = Self::new(origin);

        if let Some(url) = lookup("OKR_API_URL") {
            config.api_base_url = parse_url("OKR_API_URL", &url)?;
        }
        if let Some(tenant) = lookup("MICROSOFT_TENANT_ID").filter(|s| !s.is_empty()) {
            config.tenant_id = tenant;
        }
        if let Some(client_id) = lookup("MICROSOFT_CLIENT_ID").filter(|s| !s.is_empty()) {
            config.client_id = client_id;
        }
        if let Some(url) = lookup("OKR_REDIRECT_URI") {
            config.redirect_uri = parse_url("OKR_REDIRECT_URI", &url)?;
        }
        if let Some(scopes) = lookup("OKR_SCOPES") {
            config.scopes = scopes
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Override the identity provider authority (default `https://login.microsoftonline.com/`).
    #[must_use]
    pub fn with_authority(mut self, authority: Url) -> Self {
        self.authority = authority;
        self
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: Url) -> Self {
        self.api_base_url = url;
        self
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, url: Url) -> Self {
        self.redirect_uri = url;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_popup_size(mut self, width: u32, height: u32) -> Self {
        self.popup_size = PopupSize { width, height };
        self
    }

    /// Bound the wait for the popup's result. `None` waits indefinitely.
    #[must_use]
    pub fn with_popup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.popup_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_popup_poll_interval(mut self, interval: Duration) -> Self {
        self.popup_poll_interval = interval;
        self
    }

    /// Delays before the callback page closes itself after posting a code or an error.
    #[must_use]
    pub fn with_callback_close_delays(mut self, code: Duration, error: Duration) -> Self {
        self.callback_close_delay = code;
        self.error_close_delay = error;
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_home_path(mut self, path: impl Into<String>) -> Self {
        self.home_path = path.into();
        self
    }

    #[must_use]
    pub fn with_callback_fallback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_fallback_path = path.into();
        self
    }

    /// Navigate to the home path after a successful popup sign-in.
    #[must_use]
    pub fn with_redirect_to_home(mut self, redirect: bool) -> Self {
        self.redirect_to_home = redirect;
        self
    }

    /// Serialized app origin, e.g. `http://localhost:3000`.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn home_path(&self) -> &str {
        &self.home_path
    }

    /// Tenant-scoped OAuth2 authorize endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the tenant id does not form a valid path.
    pub fn authorize_endpoint(&self) -> Result<Url, Error> {
        self.authority
            .join(&format!("{}/oauth2/v2.0/authorize", self.tenant_id))
            .map_err(|e| Error::Config(format!("authorize endpoint: {e}")))
    }

    /// Absolute URL of a backend path, appended to the base URL verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the result is not a valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.api_base_url.as_str().trim_end_matches('/');
        let joined = format!("{base}{path}");
        joined
            .parse()
            .map_err(|e| Error::Config(format!("{joined}: {e}")))
    }
}

fn parse_url(var: &str, value: &str) -> Result<Url, Error> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("{var}: {e}")))
}
