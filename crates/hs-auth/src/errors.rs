use thiserror::Error;

/// Token lifecycle error types
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("User cancelled the authentication flow")]
    UserCancelled,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("OAuth invalid_grant - refresh token may be expired or revoked")]
    OAuthInvalidGrant,

    #[error("Xbox Live authentication failed")]
    XblBadRequest,

    #[error("XSTS authorization denied: {0}")]
    XstsDenied(#[from] XstsError),

    #[error("Halo token service rejected the XSTS token")]
    SpartanTokenRejected,

    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),

    #[error("Redirect state did not match the sign-in request")]
    StateMismatch,

    #[error("Could not bind callback listener on port {port}: {source}")]
    CallbackBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("No authorization callback received within {0:?}")]
    CallbackTimeout(std::time::Duration),

    #[error("Callback listener stopped before an authorization code arrived")]
    CallbackClosed,

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Token store is corrupted")]
    CorruptedStore,

    #[error("Token store is locked by another process")]
    LockTimeout,

    #[error("Machine secret unavailable: {0}")]
    SecretUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// XSTS-specific error codes from XErr field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XstsError {
    #[error("Account doesn't have an Xbox account (XErr: 2148916233)")]
    NoXboxAccount,

    #[error("Xbox Live not available in this country (XErr: 2148916235)")]
    RegionNotSupported,

    #[error("Adult verification required on Xbox page (XErr: 2148916236/2148916237)")]
    AdultVerificationRequired,

    #[error("Child account requires Family (XErr: 2148916238)")]
    ChildAccountRequiresFamily,

    #[error("Unknown XSTS error code: {0}")]
    Unknown(u64),
}

impl XstsError {
    /// Parse XErr code from XSTS response
    pub fn from_xerr(code: u64) -> Self {
        match code {
            2148916233 => Self::NoXboxAccount,
            2148916235 => Self::RegionNotSupported,
            2148916236 | 2148916237 => Self::AdultVerificationRequired,
            2148916238 => Self::ChildAccountRequiresFamily,
            code => Self::Unknown(code),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xerr_mapping() {
        assert_eq!(XstsError::from_xerr(2148916233), XstsError::NoXboxAccount);
        assert_eq!(
            XstsError::from_xerr(2148916237),
            XstsError::AdultVerificationRequired
        );
        assert_eq!(XstsError::from_xerr(42), XstsError::Unknown(42));
    }
}
