use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::errors::{AuthError, Result};

/// Production endpoints of the sign-in chain
pub mod endpoints {
    pub const MS_AUTHORIZE: &str = "https://login.live.com/oauth20_authorize.srf";
    pub const MS_TOKEN: &str = "https://login.live.com/oauth20_token.srf";
    pub const XBL_AUTHENTICATE: &str = "https://user.auth.xboxlive.com/user/authenticate";
    pub const XSTS_AUTHORIZE: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
    pub const SPARTAN_TOKEN: &str = "https://settings.svc.halowaypoint.com/spartan-token";
    pub const HALO_SETTINGS: &str = "https://settings.svc.halowaypoint.com";
}

/// OAuth scope requested from Microsoft
pub const SCOPE: &str = "Xboxlive.signin Xboxlive.offline_access";

/// Relying parties
pub const RP_HALO: &str = "https://prod.xsts.halowaypoint.com/";
pub const RP_XBOXLIVE: &str = "http://xboxlive.com";

/// Audience and proof type for the Spartan token request
pub const SPARTAN_AUDIENCE: &str = "urn:343:s3:services";
pub const SPARTAN_PROOF_TYPE: &str = "Xbox_XSTSv3";

/// Game build reported when asking for the active flight configuration
pub const CLEARANCE_BUILD: &str = "222249.22.06.08.1730-0";

/// Tokens within this window of their expiry are treated as expired
pub const GRACE_WINDOW: Duration = Duration::from_secs(300);

/// Lifetime stamped onto a freshly minted Spartan token
pub const SPARTAN_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Default time to wait for the browser redirect
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Endpoint set used by [`crate::HaloAuthClient`]
///
/// Defaults point at the production services; tests swap in a mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub ms_authorize: String,
    pub ms_token: String,
    pub xbl_authenticate: String,
    pub xsts_authorize: String,
    pub spartan_token: String,
    pub halo_settings: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            ms_authorize: endpoints::MS_AUTHORIZE.to_string(),
            ms_token: endpoints::MS_TOKEN.to_string(),
            xbl_authenticate: endpoints::XBL_AUTHENTICATE.to_string(),
            xsts_authorize: endpoints::XSTS_AUTHORIZE.to_string(),
            spartan_token: endpoints::SPARTAN_TOKEN.to_string(),
            halo_settings: endpoints::HALO_SETTINGS.to_string(),
        }
    }
}

impl AuthEndpoints {
    /// Point every endpoint at one base URL (used with a mock server)
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            ms_authorize: format!("{base}/oauth20_authorize.srf"),
            ms_token: format!("{base}/oauth20_token.srf"),
            xbl_authenticate: format!("{base}/user/authenticate"),
            xsts_authorize: format!("{base}/xsts/authorize"),
            spartan_token: format!("{base}/spartan-token"),
            halo_settings: base.to_string(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Opens the authorize URL so the user can sign in
#[derive(Clone)]
pub struct BrowserLauncher(Arc<dyn Fn(&Url) -> std::io::Result<()> + Send + Sync>);

impl BrowserLauncher {
    pub fn new(launch: impl Fn(&Url) -> std::io::Result<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(launch))
    }

    pub fn launch(&self, url: &Url) -> std::io::Result<()> {
        (self.0)(url)
    }
}

impl Default for BrowserLauncher {
    /// The system browser
    fn default() -> Self {
        Self::new(|url| open::that_detached(url.as_str()))
    }
}

impl fmt::Debug for BrowserLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BrowserLauncher")
    }
}

/// Configuration for HaloAuthClient
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client ID of the registered Azure application
    pub client_id: String,

    /// OAuth redirect URI; its port is where the callback listener binds
    pub redirect_uri: Url,

    pub endpoints: AuthEndpoints,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,

    /// How long to wait for the browser redirect; `None` waits forever
    pub callback_timeout: Option<Duration>,

    pub browser: BrowserLauncher,
}

impl AuthConfig {
    pub fn new(client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri,
            endpoints: AuthEndpoints::default(),
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("halo-stats".to_string()),
            callback_timeout: Some(DEFAULT_CALLBACK_TIMEOUT),
            browser: BrowserLauncher::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn with_browser(mut self, browser: BrowserLauncher) -> Self {
        self.browser = browser;
        self
    }

    /// Port the local callback listener binds to
    pub fn callback_port(&self) -> Result<u16> {
        callback_port(&self.redirect_uri)
    }
}

/// Port of a redirect URI, explicit or scheme default
pub fn callback_port(redirect_uri: &Url) -> Result<u16> {
    redirect_uri
        .port_or_known_default()
        .ok_or_else(|| AuthError::InvalidRedirect(format!("{redirect_uri} has no port")))
}
