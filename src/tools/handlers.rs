use std::sync::Arc;

use anyhow::Context;
use hs_auth::{ServiceHandle, TokenManager};
use hs_stats::HaloStatsClient;
use hs_stats::reports::{career_report, last_match_report, service_record_report};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::tools::history::ProgressionHistory;
use crate::tools::protocol::{CallToolResult, ToolInfo};

pub const AUTHENTICATE: &str = "authenticate";
pub const GET_LAST_MATCH_STATS: &str = "get_last_match_stats";
pub const GET_CAREER_RANK: &str = "get_career_rank";
pub const GET_SERVICE_RECORD: &str = "get_service_record";
pub const SIGN_OUT: &str = "sign_out";

#[derive(Debug, Default, Deserialize)]
struct PlayerArgs {
    #[serde(default)]
    gamertag: Option<String>,
}

fn player_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "gamertag": {
                "type": "string",
                "description": "Xbox gamertag to look up; defaults to the signed-in player"
            }
        }
    })
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn report_status(message: &str) {
    info!("{}", message);
}

/// The Halo tools exposed over the stdio server
#[derive(Debug, Clone)]
pub struct HaloTools {
    auth: Arc<TokenManager>,
    stats: HaloStatsClient,
    history: ProgressionHistory,
}

impl HaloTools {
    pub fn new(auth: TokenManager, stats: HaloStatsClient) -> Self {
        Self {
            auth: Arc::new(auth),
            stats,
            history: ProgressionHistory::new(),
        }
    }

    pub fn definitions() -> Vec<ToolInfo> {
        vec![
            ToolInfo {
                name: AUTHENTICATE.to_string(),
                description: "Sign in to Halo Infinite, opening a browser if no stored credentials can be used".to_string(),
                input_schema: empty_schema(),
            },
            ToolInfo {
                name: GET_LAST_MATCH_STATS.to_string(),
                description: "Stats for the signed-in player's most recent match, with career XP gained since the last check".to_string(),
                input_schema: empty_schema(),
            },
            ToolInfo {
                name: GET_CAREER_RANK.to_string(),
                description: "Career rank progression for a player".to_string(),
                input_schema: player_schema(),
            },
            ToolInfo {
                name: GET_SERVICE_RECORD.to_string(),
                description: "Matchmade service record for a player".to_string(),
                input_schema: player_schema(),
            },
            ToolInfo {
                name: SIGN_OUT.to_string(),
                description: "Forget stored Halo credentials".to_string(),
                input_schema: empty_schema(),
            },
        ]
    }

    /// Run a tool; failures are reported as error-flagged results
    #[instrument(skip(self, arguments))]
    pub async fn call(&self, name: &str, arguments: Option<Value>) -> CallToolResult {
        let outcome = match name {
            AUTHENTICATE => self.authenticate().await.map(CallToolResult::success),
            GET_LAST_MATCH_STATS => self.last_match().await.map(|v| CallToolResult::json(&v)),
            GET_CAREER_RANK => match parse_args(arguments) {
                Ok(args) => self.career_rank(args).await.map(|v| CallToolResult::json(&v)),
                Err(e) => Err(e),
            },
            GET_SERVICE_RECORD => match parse_args(arguments) {
                Ok(args) => self.service_record(args).await.map(|v| CallToolResult::json(&v)),
                Err(e) => Err(e),
            },
            SIGN_OUT => self.sign_out().await.map(CallToolResult::success),
            other => return CallToolResult::error(format!("Unknown tool: {}", other)),
        };

        outcome.unwrap_or_else(|e| {
            warn!("Tool {} failed: {:#}", name, e);
            CallToolResult::error(format!("{:#}", e))
        })
    }

    async fn handle(&self) -> anyhow::Result<ServiceHandle> {
        self.auth
            .get_or_create_handle(Some(&report_status))
            .await
            .context("Halo sign-in failed")
    }

    async fn authenticate(&self) -> anyhow::Result<String> {
        let handle = self.handle().await?;
        Ok(format!("Authenticated as xuid {}", handle.xuid()))
    }

    async fn last_match(&self) -> anyhow::Result<Value> {
        let handle = self.handle().await?;
        let xuid = handle.xuid().to_string();

        let (report, career) = tokio::join!(
            last_match_report(&self.stats, &handle, &xuid),
            career_report(&self.stats, &handle, &xuid)
        );
        let report = report.context("Failed to fetch the last match")?;

        let impact = match career {
            Ok(career) => self.history.record(&xuid, &career.progression).await,
            Err(e) => {
                warn!("Career lookup failed, skipping impact: {}", e);
                None
            }
        };

        Ok(json!({ "match": report, "careerImpact": impact }))
    }

    async fn career_rank(&self, args: PlayerArgs) -> anyhow::Result<Value> {
        let handle = self.handle().await?;
        let xuid = self
            .stats
            .target_xuid(&handle, args.gamertag.as_deref())
            .await
            .context("Failed to resolve player")?;

        let report = career_report(&self.stats, &handle, &xuid)
            .await
            .context("Failed to fetch career rank")?;
        let impact = self.history.record(&xuid, &report.progression).await;

        Ok(json!({ "career": report, "impact": impact }))
    }

    async fn service_record(&self, args: PlayerArgs) -> anyhow::Result<Value> {
        let handle = self.handle().await?;
        let xuid = self
            .stats
            .target_xuid(&handle, args.gamertag.as_deref())
            .await
            .context("Failed to resolve player")?;

        let report = service_record_report(&self.stats, &handle, &xuid)
            .await
            .context("Failed to fetch service record")?;
        Ok(serde_json::to_value(report)?)
    }

    async fn sign_out(&self) -> anyhow::Result<String> {
        self.auth.sign_out().await.context("Failed to clear credentials")?;
        self.history.clear().await;
        Ok("Signed out".to_string())
    }
}

fn parse_args(arguments: Option<Value>) -> anyhow::Result<PlayerArgs> {
    match arguments {
        None | Some(Value::Null) => Ok(PlayerArgs::default()),
        Some(value) => serde_json::from_value(value).context("Invalid tool arguments"),
    }
}
