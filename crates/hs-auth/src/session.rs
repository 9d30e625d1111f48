use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{GRACE_WINDOW, SPARTAN_TOKEN_LIFETIME};

/// Header carrying the Spartan token on every Halo request
pub const SPARTAN_HEADER: &str = "x-343-authorization-spartan";

/// Header carrying the active flight configuration id
pub const CLEARANCE_HEADER: &str = "343-clearance";

/// Current wall-clock time as epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn grace_ms() -> i64 {
    GRACE_WINDOW.as_millis() as i64
}

/// Microsoft OAuth tokens
#[derive(Clone, PartialEq, Eq)]
pub struct MsTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl MsTokens {
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: u64) -> Self {
        let expires_at = Utc::now() + chrono::Duration::seconds(expires_in as i64);
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }
}

impl std::fmt::Debug for MsTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsTokens")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Xbox Live or XSTS token with its user hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XboxToken {
    pub token: String,
    pub uhs: String,
    pub xuid: Option<String>,
}

impl XboxToken {
    /// `Authorization` header value understood by Xbox Live services
    pub fn authorization_header(&self) -> String {
        format!("XBL3.0 x={};{}", self.uhs, self.token)
    }
}

/// Result of a successful pass through the token chain
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub refresh_token: String,
    pub spartan_token: String,
    pub xuid: String,
    pub xbl_token: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("xuid", &self.xuid)
            .field("has_xbl_token", &self.xbl_token.is_some())
            .finish_non_exhaustive()
    }
}

/// The unit persisted to disk
///
/// Opaque outside this crate: callers only ever see a [`ServiceHandle`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    pub refresh_token: String,
    pub spartan_token: String,
    /// Absolute expiry, epoch milliseconds
    pub spartan_token_expiry: i64,
    #[serde(rename = "subjectId")]
    pub xuid: String,
    #[serde(
        rename = "secondaryToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub xbl_token: Option<String>,
}

impl CredentialBundle {
    /// Build a bundle whose Spartan token expires one hour after `now_ms`
    pub fn from_grant(grant: TokenGrant, now_ms: i64) -> Self {
        Self {
            refresh_token: grant.refresh_token,
            spartan_token: grant.spartan_token,
            spartan_token_expiry: now_ms + SPARTAN_TOKEN_LIFETIME.as_millis() as i64,
            xuid: grant.xuid,
            xbl_token: grant.xbl_token,
        }
    }

    /// True while the token is more than the grace window away from expiry
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms < self.spartan_token_expiry - grace_ms()
    }

    pub fn to_handle(&self) -> ServiceHandle {
        ServiceHandle {
            spartan_token: self.spartan_token.clone(),
            xuid: self.xuid.clone(),
            clearance: None,
            xbl_token: self.xbl_token.clone(),
            expires_at_ms: self.spartan_token_expiry,
        }
    }
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("xuid", &self.xuid)
            .field("spartan_token_expiry", &self.spartan_token_expiry)
            .field("has_xbl_token", &self.xbl_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Authenticated handle for the Halo services
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    spartan_token: String,
    xuid: String,
    clearance: Option<String>,
    xbl_token: Option<String>,
    expires_at_ms: i64,
}

impl ServiceHandle {
    pub fn new(spartan_token: String, xuid: String, expires_at_ms: i64) -> Self {
        Self {
            spartan_token,
            xuid,
            clearance: None,
            xbl_token: None,
            expires_at_ms,
        }
    }

    pub fn with_clearance(mut self, clearance: String) -> Self {
        self.clearance = Some(clearance);
        self
    }

    pub fn with_xbl_token(mut self, xbl_token: Option<String>) -> Self {
        self.xbl_token = xbl_token;
        self
    }

    pub fn spartan_token(&self) -> &str {
        &self.spartan_token
    }

    /// Numeric Xbox user id of the signed-in player
    pub fn xuid(&self) -> &str {
        &self.xuid
    }

    pub fn clearance(&self) -> Option<&str> {
        self.clearance.as_deref()
    }

    /// `XBL3.0 x=...` credential for Xbox Live people lookups
    pub fn xbl_token(&self) -> Option<&str> {
        self.xbl_token.as_deref()
    }

    pub fn expires_at_ms(&self) -> i64 {
        self.expires_at_ms
    }

    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms - grace_ms()
    }

    /// Attach the Spartan token and, when known, the clearance header
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(SPARTAN_HEADER, &self.spartan_token);
        match &self.clearance {
            Some(clearance) => request.header(CLEARANCE_HEADER, clearance),
            None => request,
        }
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("xuid", &self.xuid)
            .field("clearance", &self.clearance)
            .field("expires_at_ms", &self.expires_at_ms)
            .finish_non_exhaustive()
    }
}
