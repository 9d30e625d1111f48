use serde::{Deserialize, Serialize};

/// Microsoft OAuth token response (from both code and refresh_token grants)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Xbox Live user.authenticate request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XblAuthRequest {
    pub properties: XblAuthProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XblAuthProperties {
    pub auth_method: String,
    pub site_name: String,
    pub rps_ticket: String,
}

/// Response shape shared by user.authenticate and xsts/authorize
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XboxTokenResponse {
    pub token: String,
    pub display_claims: XblDisplayClaims,
    #[serde(default)]
    pub not_after: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XblDisplayClaims {
    pub xui: Vec<XblUserInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XblUserInfo {
    pub uhs: String,
    #[serde(default)]
    pub xid: Option<String>,
}

/// XSTS authorize request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsAuthRequest {
    pub properties: XstsAuthProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsAuthProperties {
    pub sandbox_id: String,
    pub user_tokens: Vec<String>,
}

/// XSTS error response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsErrorResponse {
    #[serde(rename = "XErr")]
    pub xerr: u64,
    #[serde(default)]
    pub message: Option<String>,
}

/// Halo spartan-token request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpartanTokenRequest {
    pub audience: String,
    pub min_version: String,
    pub proof: Vec<SpartanTokenProof>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpartanTokenProof {
    pub token: String,
    pub token_type: String,
}

/// Halo spartan-token response
#[derive(Debug, Clone, Deserialize)]
pub struct SpartanTokenResponse {
    #[serde(rename = "SpartanToken", alias = "spartanToken")]
    pub spartan_token: String,
    #[serde(rename = "ExpiresUtc", alias = "expiresUtc", default)]
    pub expires_utc: Option<ExpiresUtc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpiresUtc {
    #[serde(rename = "ISO8601Date", alias = "iso8601Date")]
    pub iso8601_date: String,
}

/// Active flight configuration (the "clearance")
#[derive(Debug, Clone, Deserialize)]
pub struct FlightConfiguration {
    #[serde(
        rename = "FlightConfigurationId",
        alias = "flightConfigurationId",
        default
    )]
    pub flight_configuration_id: Option<String>,
}
