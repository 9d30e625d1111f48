use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::callback::CallbackListener;
use crate::config::{
    AuthConfig, CLEARANCE_BUILD, RP_HALO, RP_XBOXLIVE, SCOPE, SPARTAN_AUDIENCE, SPARTAN_PROOF_TYPE,
};
use crate::crypto;
use crate::errors::{AuthError, Result, XstsError};
use crate::manager::{AuthFlow, StatusCallback};
use crate::models::*;
use crate::session::{MsTokens, ServiceHandle, TokenGrant, XboxToken};

fn body_snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Random, URL-safe value for the OAuth `state` parameter
fn new_state() -> Result<String> {
    let bytes: [u8; 16] = crypto::random_bytes()?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Client for the Microsoft → Xbox Live → XSTS → Halo token chain
#[derive(Debug, Clone)]
pub struct HaloAuthClient {
    config: AuthConfig,
    http: Client,
}

impl HaloAuthClient {
    /// Create a new authentication client
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("halo-stats"))
            .build()?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Build the authorization URL for the user to visit
    #[instrument(skip(self))]
    pub fn build_authorize_url(&self, state: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.config.endpoints.ms_authorize)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("approval_prompt", "auto")
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", SCOPE);

        if let Some(s) = state {
            url.query_pairs_mut().append_pair("state", s);
        }

        debug!("Built authorize URL");
        Ok(url)
    }

    async fn request_ms_token(&self, form: &[(&str, &str)]) -> Result<MsTokens> {
        let response = self
            .http
            .post(&self.config.endpoints.ms_token)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if body.contains("invalid_grant") {
                return Err(AuthError::OAuthInvalidGrant);
            }

            return Err(AuthError::Http {
                status,
                body_snippet: body_snippet(&body),
            });
        }

        let token_response: MsTokenResponse = response.json().await?;
        Ok(MsTokens::new(
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
        ))
    }

    /// Exchange authorization code for Microsoft tokens
    #[instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &str) -> Result<MsTokens> {
        debug!("Exchanging authorization code for tokens");
        self.request_ms_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("approval_prompt", "auto"),
            ("scope", SCOPE),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", &self.config.client_id),
        ])
        .await
    }

    /// Refresh Microsoft tokens using refresh_token
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_ms_token(&self, refresh_token: &str) -> Result<MsTokens> {
        debug!("Refreshing Microsoft access token");
        self.request_ms_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", SCOPE),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", &self.config.client_id),
        ])
        .await
    }

    /// Authenticate with Xbox Live
    #[instrument(skip(self, ms_access_token))]
    pub async fn xbl_authenticate(&self, ms_access_token: &str) -> Result<XboxToken> {
        let request = XblAuthRequest {
            properties: XblAuthProperties {
                auth_method: "RPS".to_string(),
                site_name: "user.auth.xboxlive.com".to_string(),
                rps_ticket: format!("d={}", ms_access_token),
            },
            relying_party: "http://auth.xboxlive.com".to_string(),
            token_type: "JWT".to_string(),
        };

        debug!("Authenticating with Xbox Live");
        let response = self
            .http
            .post(&self.config.endpoints.xbl_authenticate)
            .header("Accept", "application/json")
            .header("x-xbl-contract-version", "1")
            .json(&request)
            .send()
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            return Err(AuthError::XblBadRequest);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Http {
                status,
                body_snippet: body_snippet(&body),
            });
        }

        let xbl_response: XboxTokenResponse = response.json().await?;
        xbox_token(xbl_response)
    }

    /// Authorize with XSTS for a relying party
    #[instrument(skip(self, xbl_token))]
    pub async fn xsts_authorize(&self, xbl_token: &str, relying_party: &str) -> Result<XboxToken> {
        let request = XstsAuthRequest {
            properties: XstsAuthProperties {
                sandbox_id: "RETAIL".to_string(),
                user_tokens: vec![xbl_token.to_string()],
            },
            relying_party: relying_party.to_string(),
            token_type: "JWT".to_string(),
        };

        debug!("Authorizing with XSTS");
        let response = self
            .http
            .post(&self.config.endpoints.xsts_authorize)
            .header("Accept", "application/json")
            .header("x-xbl-contract-version", "1")
            .json(&request)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let error_response: XstsErrorResponse = response.json().await?;
            return Err(XstsError::from_xerr(error_response.xerr).into());
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Http {
                status,
                body_snippet: body_snippet(&body),
            });
        }

        let xsts_response: XboxTokenResponse = response.json().await?;
        xbox_token(xsts_response)
    }

    /// Trade a Halo-audience XSTS token for a Spartan token
    #[instrument(skip(self, xsts_token))]
    pub async fn spartan_token(&self, xsts_token: &str) -> Result<String> {
        let request = SpartanTokenRequest {
            audience: SPARTAN_AUDIENCE.to_string(),
            min_version: "4".to_string(),
            proof: vec![SpartanTokenProof {
                token: xsts_token.to_string(),
                token_type: SPARTAN_PROOF_TYPE.to_string(),
            }],
        };

        debug!("Requesting Spartan token");
        let response = self
            .http
            .post(&self.config.endpoints.spartan_token)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::SpartanTokenRejected);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Http {
                status,
                body_snippet: body_snippet(&body),
            });
        }

        let spartan: SpartanTokenResponse = response.json().await?;
        if let Some(expires) = &spartan.expires_utc {
            debug!("Spartan token expires at {}", expires.iso8601_date);
        }
        Ok(spartan.spartan_token)
    }

    /// Run the chain from Microsoft tokens to a Spartan token
    ///
    /// A second XSTS authorization against Xbox Live yields the player's
    /// XUID and the credential used for people lookups.
    #[instrument(skip(self, ms, previous_refresh_token))]
    pub async fn complete_chain(
        &self,
        ms: MsTokens,
        previous_refresh_token: Option<&str>,
    ) -> Result<TokenGrant> {
        let refresh_token = ms
            .refresh_token
            .clone()
            .or_else(|| previous_refresh_token.map(str::to_string))
            .ok_or_else(|| AuthError::InvalidResponse("Missing refresh token".to_string()))?;

        let xbl = self.xbl_authenticate(&ms.access_token).await?;
        let halo_xsts = self.xsts_authorize(&xbl.token, RP_HALO).await?;
        let spartan_token = self.spartan_token(&halo_xsts.token).await?;

        let live_xsts = self.xsts_authorize(&xbl.token, RP_XBOXLIVE).await?;
        let xuid = live_xsts
            .xuid
            .clone()
            .ok_or_else(|| AuthError::InvalidResponse("Missing XUID".to_string()))?;

        info!("Token chain complete for xuid {}", xuid);
        Ok(TokenGrant {
            refresh_token,
            spartan_token,
            xuid,
            xbl_token: Some(live_xsts.authorization_header()),
        })
    }

    /// Complete login flow from authorization code to a token grant
    #[instrument(skip(self, code))]
    pub async fn complete_login_with_code(&self, code: &str) -> Result<TokenGrant> {
        let ms = self.exchange_code(code).await?;
        self.complete_chain(ms, None).await
    }

    /// Fetch the active flight configuration id for the player
    #[instrument(skip(self, handle))]
    pub async fn active_clearance(&self, handle: &ServiceHandle) -> Result<Option<String>> {
        let url = format!(
            "{}/oban/flight-configurations/titles/hi/audiences/RETAIL/players/xuid({})/active",
            self.config.endpoints.halo_settings.trim_end_matches('/'),
            handle.xuid()
        );

        let response = handle
            .authorize(self.http.get(url))
            .header("Accept", "application/json")
            .query(&[("sandbox", "UNUSED"), ("build", CLEARANCE_BUILD)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Http {
                status,
                body_snippet: body_snippet(&body),
            });
        }

        let flight: FlightConfiguration = response.json().await?;
        Ok(flight.flight_configuration_id)
    }
}

fn xbox_token(response: XboxTokenResponse) -> Result<XboxToken> {
    let user_info = response
        .display_claims
        .xui
        .into_iter()
        .next()
        .ok_or_else(|| AuthError::InvalidResponse("Missing XUI claims".to_string()))?;

    Ok(XboxToken {
        token: response.token,
        uhs: user_info.uhs,
        xuid: user_info.xid,
    })
}

#[async_trait::async_trait]
impl AuthFlow for HaloAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let ms = self.refresh_ms_token(refresh_token).await?;
        self.complete_chain(ms, Some(refresh_token)).await
    }

    async fn authenticate_interactive(
        &self,
        status: Option<StatusCallback<'_>>,
    ) -> Result<TokenGrant> {
        let report = |message: &str| {
            if let Some(callback) = status {
                callback(message);
            }
        };

        // Bind before opening the browser so the redirect cannot race the listener
        let listener = CallbackListener::bind(&self.config.redirect_uri).await?;
        let state = new_state()?;
        let url = self.build_authorize_url(Some(&state))?;

        report("Opening your browser to sign in with Microsoft...");
        if let Err(e) = self.config.browser.launch(&url) {
            warn!("Failed to launch browser: {}", e);
            report(&format!("Could not open a browser. Visit this URL to sign in: {url}"));
        }

        report("Waiting for sign-in to complete...");
        let code = listener
            .wait_for_code(&state, self.config.callback_timeout)
            .await?;

        report("Exchanging tokens...");
        self.complete_login_with_code(&code).await
    }

    async fn fetch_clearance(&self, handle: &ServiceHandle) -> Result<Option<String>> {
        self.active_clearance(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthEndpoints, BrowserLauncher};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HaloAuthClient {
        let config = AuthConfig::new(
            "client-id",
            Url::parse("http://localhost:8765/callback").unwrap(),
        )
        .with_endpoints(AuthEndpoints::with_base(&server.uri()));
        HaloAuthClient::new(config).unwrap()
    }

    fn xbox_response(token: &str, xid: Option<&str>) -> serde_json::Value {
        let mut claims = json!({ "uhs": "1234" });
        if let Some(xid) = xid {
            claims["xid"] = json!(xid);
            claims["gtg"] = json!("Master Chief");
        }
        json!({
            "IssueInstant": "2026-10-19T00:00:00Z",
            "NotAfter": "2026-10-20T00:00:00Z",
            "Token": token,
            "DisplayClaims": { "xui": [claims] }
        })
    }

    async fn mount_chain(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/user/authenticate"))
            .and(body_partial_json(json!({ "Properties": { "RpsTicket": "d=ms-access" } })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(xbox_response("xbl-token", None)),
            )
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .and(body_partial_json(json!({ "RelyingParty": RP_HALO })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(xbox_response("halo-xsts", None)),
            )
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .and(body_partial_json(json!({ "RelyingParty": RP_XBOXLIVE })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(xbox_response("live-xsts", Some("2533274800000001"))),
            )
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/spartan-token"))
            .and(body_partial_json(json!({ "Proof": [{ "Token": "halo-xsts" }] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "SpartanToken": "v4=spartan",
                "ExpiresUtc": { "ISO8601Date": "2026-10-19T04:00:00Z" },
                "TokenDuration": "PT4H"
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_authorize_url() {
        let config = AuthConfig::new("abc", Url::parse("http://localhost:8765/callback").unwrap());
        let client = HaloAuthClient::new(config).unwrap();
        let url = client.build_authorize_url(Some("st")).unwrap();

        assert!(url.as_str().starts_with("https://login.live.com/oauth20_authorize.srf?"));
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "abc");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8765/callback");
        assert_eq!(pairs["scope"], SCOPE);
        assert_eq!(pairs["state"], "st");
    }

    #[tokio::test]
    async fn test_refresh_runs_full_chain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ms-access",
                "refresh_token": "new-refresh",
                "expires_in": 3600,
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;
        mount_chain(&server).await;

        let grant = client_for(&server).refresh("old-refresh").await.unwrap();
        assert_eq!(grant.refresh_token, "new-refresh");
        assert_eq!(grant.spartan_token, "v4=spartan");
        assert_eq!(grant.xuid, "2533274800000001");
        assert_eq!(grant.xbl_token.as_deref(), Some("XBL3.0 x=1234;live-xsts"));
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_token_when_not_rotated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ms-access",
                "expires_in": 3600,
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;
        mount_chain(&server).await;

        let grant = client_for(&server).refresh("old-refresh").await.unwrap();
        assert_eq!(grant.refresh_token, "old-refresh");
    }

    #[tokio::test]
    async fn test_invalid_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "The refresh token has expired."
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).refresh_ms_token("stale").await;
        assert!(matches!(result, Err(AuthError::OAuthInvalidGrant)));
    }

    #[tokio::test]
    async fn test_code_exchange_runs_full_chain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=M.C-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ms-access",
                "refresh_token": "first-refresh",
                "expires_in": 3600,
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;
        mount_chain(&server).await;

        let grant = client_for(&server)
            .complete_login_with_code("M.C-code")
            .await
            .unwrap();
        assert_eq!(grant.refresh_token, "first-refresh");
        assert_eq!(grant.xuid, "2533274800000001");
    }

    /// Redirect URI on a port that was free a moment ago
    fn free_redirect_uri() -> Url {
        let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = spare.local_addr().unwrap().port();
        drop(spare);
        Url::parse(&format!("http://127.0.0.1:{port}/callback")).unwrap()
    }

    /// Play the browser: follow the authorize URL back to the redirect URI
    fn visit(authorize_url: &Url, code: &str) {
        let pairs: std::collections::HashMap<_, _> =
            authorize_url.query_pairs().into_owned().collect();
        let mut redirect = Url::parse(&pairs["redirect_uri"]).unwrap();
        redirect
            .query_pairs_mut()
            .append_pair("code", code)
            .append_pair("state", &pairs["state"]);
        tokio::spawn(async move {
            let _ = reqwest::get(redirect).await;
        });
    }

    async fn mount_code_exchange(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=M.C-browser"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ms-access",
                "refresh_token": "browser-refresh",
                "expires_in": 3600,
                "token_type": "bearer"
            })))
            .mount(server)
            .await;
        mount_chain(server).await;
    }

    fn interactive_client(server: &MockServer, browser: BrowserLauncher) -> HaloAuthClient {
        let config = AuthConfig::new("client-id", free_redirect_uri())
            .with_endpoints(AuthEndpoints::with_base(&server.uri()))
            .with_callback_timeout(Some(Duration::from_secs(10)))
            .with_browser(browser);
        HaloAuthClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_interactive_sign_in_through_browser() {
        let server = MockServer::start().await;
        mount_code_exchange(&server).await;

        let opened = Arc::new(Mutex::new(Vec::<Url>::new()));
        let seen = opened.clone();
        let browser = BrowserLauncher::new(move |url| {
            seen.lock().unwrap().push(url.clone());
            visit(url, "M.C-browser");
            Ok(())
        });
        let client = interactive_client(&server, browser);

        let lines = Mutex::new(Vec::<String>::new());
        let status = |message: &str| lines.lock().unwrap().push(message.to_string());
        let grant = client
            .authenticate_interactive(Some(&status))
            .await
            .unwrap();

        assert_eq!(grant.refresh_token, "browser-refresh");
        assert_eq!(grant.spartan_token, "v4=spartan");
        assert_eq!(grant.xuid, "2533274800000001");

        let opened = opened.lock().unwrap();
        assert_eq!(opened.len(), 1);
        let state = opened[0]
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .unwrap();
        assert!(state.len() >= 16);

        assert_eq!(
            *lines.lock().unwrap(),
            vec![
                "Opening your browser to sign in with Microsoft...",
                "Waiting for sign-in to complete...",
                "Exchanging tokens...",
            ]
        );
    }

    const MANUAL_PREFIX: &str = "Could not open a browser. Visit this URL to sign in: ";

    #[tokio::test]
    async fn test_interactive_sign_in_reports_url_when_browser_fails() {
        let server = MockServer::start().await;
        mount_code_exchange(&server).await;

        let browser = BrowserLauncher::new(|_| {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no browser"))
        });
        let client = interactive_client(&server, browser);

        let lines = Mutex::new(Vec::<String>::new());
        let status = |message: &str| {
            // The user copies the printed URL into a browser by hand
            if let Some(url) = message.strip_prefix(MANUAL_PREFIX) {
                visit(&Url::parse(url).unwrap(), "M.C-browser");
            }
            lines.lock().unwrap().push(message.to_string());
        };
        let grant = client
            .authenticate_interactive(Some(&status))
            .await
            .unwrap();
        assert_eq!(grant.refresh_token, "browser-refresh");

        let lines = lines.lock().unwrap();
        assert!(
            lines
                .iter()
                .any(|line| line.contains("oauth20_authorize.srf?") && line.contains("state="))
        );
    }

    #[test]
    fn test_states_are_random() {
        let first = new_state().unwrap();
        assert_ne!(first, new_state().unwrap());
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_xsts_denied_maps_xerr() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "Identity": "0",
                "XErr": 2148916233u64,
                "Message": "",
                "Redirect": "https://start.ui.xboxlive.com/CreateAccount"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).xsts_authorize("xbl", RP_HALO).await;
        assert!(matches!(
            result,
            Err(AuthError::XstsDenied(XstsError::NoXboxAccount))
        ));
    }

    #[tokio::test]
    async fn test_spartan_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/spartan-token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = client_for(&server).spartan_token("xsts").await;
        assert!(matches!(result, Err(AuthError::SpartanTokenRejected)));
    }

    #[tokio::test]
    async fn test_clearance_sends_spartan_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/oban/flight-configurations/titles/hi/audiences/RETAIL/players/xuid(42)/active",
            ))
            .and(header("x-343-authorization-spartan", "v4=spartan"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "FlightConfigurationId": "flight-1"
            })))
            .mount(&server)
            .await;

        let handle = ServiceHandle::new("v4=spartan".to_string(), "42".to_string(), i64::MAX);
        let clearance = client_for(&server).fetch_clearance(&handle).await.unwrap();
        assert_eq!(clearance.as_deref(), Some("flight-1"));
    }
}
