use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hs_auth::ServiceHandle;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::config::{CAREER_RANK_TABLE_PATH, CAREER_TRACK, StatsConfig};
use crate::errors::{Result, StatsError};
use crate::models::*;
use crate::progression::RankTable;

/// Transparent 1x1 PNG returned when an icon cannot be fetched
pub const PLACEHOLDER_ICON: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

/// Name returned when an asset lookup fails
pub const UNKNOWN_ASSET: &str = "Unknown";

fn body_snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

/// UGC asset families served by the discovery service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Map,
    GameVariant,
    Playlist,
}

impl AssetKind {
    fn path_segment(self) -> &'static str {
        match self {
            AssetKind::Map => "maps",
            AssetKind::GameVariant => "ugcGameVariants",
            AssetKind::Playlist => "playlists",
        }
    }
}

/// Client for the Halo Infinite stats, economy and content services
#[derive(Debug, Clone)]
pub struct HaloStatsClient {
    config: StatsConfig,
    http: Client,
}

impl HaloStatsClient {
    pub fn new(config: StatsConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.header("Accept", "application/json").send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StatsError::Http {
                status,
                body_snippet: body_snippet(&body),
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        handle: &ServiceHandle,
        url: String,
    ) -> Result<T> {
        debug!("GET {}", url);
        let response = self.send(handle.authorize(self.http.get(url))).await?;
        let value: serde_json::Value = response.json().await?;
        decode(value)
    }

    /// Raw career rank progress for a player
    #[instrument(skip(self, handle))]
    pub async fn career_rank(&self, handle: &ServiceHandle, xuid: &str) -> Result<CareerProgress> {
        let url = format!(
            "{}/hi/players/xuid({})/rewardtracks/{}",
            self.config.endpoints.economy, xuid, CAREER_TRACK
        );
        let response: CareerRankResponse = self.get_json(handle, url).await?;
        Ok(response.current_progress)
    }

    /// Static career rank definitions
    #[instrument(skip(self, handle))]
    pub async fn career_rank_table(&self, handle: &ServiceHandle) -> Result<RankTable> {
        let url = format!("{}/hi/{}", self.config.endpoints.gamecms, CAREER_RANK_TABLE_PATH);
        let response: RankTableResponse = self.get_json(handle, url).await?;
        Ok(RankTable::new(response.into_definitions()))
    }

    /// Id of the most recent match the player took part in
    #[instrument(skip(self, handle))]
    pub async fn latest_match_id(&self, handle: &ServiceHandle, xuid: &str) -> Result<String> {
        let url = format!(
            "{}/hi/players/xuid({})/matches?start=0&count=1",
            self.config.endpoints.halostats, xuid
        );
        let history: MatchHistoryResponse = self.get_json(handle, url).await?;
        history
            .results
            .into_iter()
            .next()
            .map(|entry| entry.match_id)
            .ok_or(StatsError::NoMatches)
    }

    #[instrument(skip(self, handle))]
    pub async fn match_stats(&self, handle: &ServiceHandle, match_id: &str) -> Result<MatchStats> {
        let url = format!("{}/hi/matches/{}/stats", self.config.endpoints.halostats, match_id);
        self.get_json(handle, url).await
    }

    /// Matchmade service record
    #[instrument(skip(self, handle))]
    pub async fn service_record(
        &self,
        handle: &ServiceHandle,
        xuid: &str,
    ) -> Result<ServiceRecord> {
        let url = format!(
            "{}/hi/players/xuid({})/matchmade/servicerecord",
            self.config.endpoints.halostats, xuid
        );
        self.get_json(handle, url).await
    }

    /// Public name of a UGC asset, or "Unknown" when it cannot be resolved
    #[instrument(skip(self, handle))]
    pub async fn asset_name(
        &self,
        handle: &ServiceHandle,
        kind: AssetKind,
        asset_id: &str,
        version_id: &str,
    ) -> String {
        let url = format!(
            "{}/hi/{}/{}/versions/{}",
            self.config.endpoints.discovery,
            kind.path_segment(),
            asset_id,
            version_id
        );

        match self.get_json::<AssetMetadata>(handle, url).await {
            Ok(AssetMetadata {
                public_name: Some(name),
            }) if !name.is_empty() => name,
            Ok(_) => UNKNOWN_ASSET.to_string(),
            Err(e) => {
                warn!("Asset lookup failed: {}", e);
                UNKNOWN_ASSET.to_string()
            }
        }
    }

    /// Fetch a CMS image as a base64 data URI, falling back to a placeholder
    #[instrument(skip(self, handle))]
    pub async fn icon_data_uri(&self, handle: &ServiceHandle, path: &str) -> String {
        match self.fetch_icon(handle, path).await {
            Ok(uri) => uri,
            Err(e) => {
                warn!("Icon fetch failed: {}", e);
                PLACEHOLDER_ICON.to_string()
            }
        }
    }

    async fn fetch_icon(&self, handle: &ServiceHandle, path: &str) -> Result<String> {
        let url = format!(
            "{}/hi/images/file/{}",
            self.config.endpoints.gamecms,
            path.trim_start_matches('/')
        );
        let response = self.send(handle.authorize(self.http.get(url))).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?;

        Ok(format!("data:{};base64,{}", content_type, STANDARD.encode(&bytes)))
    }

    /// Resolve a gamertag to a xuid through the Xbox Live people search
    ///
    /// `xbl_token` is the full `XBL3.0 x=<uhs>;<token>` authorization value.
    #[instrument(skip(self, xbl_token))]
    pub async fn resolve_gamertag(&self, xbl_token: &str, gamertag: &str) -> Result<String> {
        let url = format!("{}/users/me/people/search", self.config.endpoints.peoplehub);
        let request = self
            .http
            .get(url)
            .query(&[("q", gamertag), ("maxItems", "25")])
            .header("Authorization", xbl_token)
            .header("x-xbl-contract-version", "3")
            .header("Accept-Language", "en-us");

        let response = self.send(request).await?;
        let value: serde_json::Value = response.json().await?;
        let search: PeopleSearchResponse = decode(value)?;

        search
            .people
            .into_iter()
            .find(|person| person.matches_gamertag(gamertag))
            .map(|person| person.xuid)
            .ok_or_else(|| StatsError::PlayerNotFound(gamertag.to_string()))
    }

    /// Resolve the target player: the signed-in user when no gamertag is given
    pub async fn target_xuid(
        &self,
        handle: &ServiceHandle,
        gamertag: Option<&str>,
    ) -> Result<String> {
        match gamertag.map(str::trim).filter(|g| !g.is_empty()) {
            None => Ok(handle.xuid().to_string()),
            Some(gamertag) => {
                let xbl_token = handle.xbl_token().ok_or(StatsError::MissingXblToken)?;
                self.resolve_gamertag(xbl_token, gamertag).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatsEndpoints;
    use hs_auth::session::{CLEARANCE_HEADER, SPARTAN_HEADER};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HaloStatsClient {
        HaloStatsClient::new(StatsConfig {
            endpoints: StatsEndpoints::with_base(&server.uri()),
            ..StatsConfig::default()
        })
        .unwrap()
    }

    fn handle() -> ServiceHandle {
        ServiceHandle::new("v4=spartan".to_string(), "42".to_string(), i64::MAX)
            .with_clearance("flight-1".to_string())
            .with_xbl_token(Some("XBL3.0 x=1234;live".to_string()))
    }

    #[tokio::test]
    async fn test_career_rank_sends_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hi/players/xuid(42)/rewardtracks/careerrank1"))
            .and(header(SPARTAN_HEADER, "v4=spartan"))
            .and(header(CLEARANCE_HEADER, "flight-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "CurrentProgress": { "Rank": 10, "PartialProgress": 300, "HasReachedMaxRank": false }
            })))
            .mount(&server)
            .await;

        let progress = client_for(&server).career_rank(&handle(), "42").await.unwrap();
        assert_eq!(progress.rank, 10);
        assert_eq!(progress.partial_progress, 300);
    }

    #[tokio::test]
    async fn test_rank_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/hi/{}", CAREER_RANK_TABLE_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Ranks": [
                    { "Rank": 1, "RankTitle": { "value": "Recruit" }, "TierType": "Bronze", "XpRequiredForRank": 100 },
                    { "Rank": 2, "RankTitle": { "value": "Cadet" }, "TierType": "Bronze", "XpRequiredForRank": 200 }
                ]
            })))
            .mount(&server)
            .await;

        let table = client_for(&server).career_rank_table(&handle()).await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(2).unwrap().title, "Cadet");
    }

    #[tokio::test]
    async fn test_latest_match_empty_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hi/players/xuid(42)/matches"))
            .and(query_param("count", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Results": [] })))
            .mount(&server)
            .await;

        let result = client_for(&server).latest_match_id(&handle(), "42").await;
        assert!(matches!(result, Err(StatsError::NoMatches)));
    }

    #[tokio::test]
    async fn test_latest_match_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hi/players/xuid(42)/matches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "matchId": "abc-123" }]
            })))
            .mount(&server)
            .await;

        let id = client_for(&server).latest_match_id(&handle(), "42").await.unwrap();
        assert_eq!(id, "abc-123");
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hi/players/xuid(42)/matchmade/servicerecord"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let result = client_for(&server).service_record(&handle(), "42").await;
        match result {
            Err(StatsError::Http { status, body_snippet }) => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body_snippet, "expired");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_asset_name_falls_back_to_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hi/maps/map-1/versions/v-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "PublicName": "Streets" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/hi/playlists/pl-1/versions/v-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let map = client.asset_name(&handle(), AssetKind::Map, "map-1", "v-1").await;
        let playlist = client
            .asset_name(&handle(), AssetKind::Playlist, "pl-1", "v-1")
            .await;

        assert_eq!(map, "Streets");
        assert_eq!(playlist, UNKNOWN_ASSET);
    }

    #[tokio::test]
    async fn test_icon_data_uri() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hi/images/file/career_rank/1.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let icon = client.icon_data_uri(&handle(), "career_rank/1.png").await;
        assert_eq!(icon, "data:image/png;base64,AQID");

        let missing = client.icon_data_uri(&handle(), "career_rank/2.png").await;
        assert_eq!(missing, PLACEHOLDER_ICON);
    }

    #[tokio::test]
    async fn test_resolve_gamertag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/people/search"))
            .and(query_param("q", "Master Chief"))
            .and(header("Authorization", "XBL3.0 x=1234;live"))
            .and(header("x-xbl-contract-version", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "people": [
                    { "xuid": "111", "gamertag": "Master Chief 2" },
                    { "xuid": "117", "gamertag": "Master Chief" }
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let xuid = client.target_xuid(&handle(), Some("Master Chief")).await.unwrap();
        assert_eq!(xuid, "117");
    }

    #[tokio::test]
    async fn test_resolve_unknown_gamertag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/people/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "people": [] })))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .resolve_gamertag("XBL3.0 x=1;t", "Nobody")
            .await;
        assert!(matches!(result, Err(StatsError::PlayerNotFound(g)) if g == "Nobody"));
    }

    #[tokio::test]
    async fn test_target_defaults_to_signed_in_player() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        assert_eq!(client.target_xuid(&handle(), None).await.unwrap(), "42");
        assert_eq!(client.target_xuid(&handle(), Some("  ")).await.unwrap(), "42");

        let without_xbl = ServiceHandle::new("s".to_string(), "42".to_string(), i64::MAX);
        let result = client.target_xuid(&without_xbl, Some("Someone")).await;
        assert!(matches!(result, Err(StatsError::MissingXblToken)));
    }
}
