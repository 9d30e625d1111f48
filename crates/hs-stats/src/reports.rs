//! JSON payloads returned to callers of the stats tools.

use hs_auth::ServiceHandle;
use serde::Serialize;
use tracing::instrument;

use crate::client::{AssetKind, HaloStatsClient, UNKNOWN_ASSET};
use crate::errors::{Result, StatsError};
use crate::models::{AssetRef, CoreStats, MatchStats, ServiceRecord, outcome_label};
use crate::progression::{ProgressionSnapshot, progression_from};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CareerReport {
    pub xuid: String,
    pub progression: ProgressionSnapshot,
    pub current_icon: Option<String>,
    pub next_icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub kda: f64,
    pub accuracy: f64,
    pub score: i64,
    pub medal_count: u32,
}

impl From<&CoreStats> for PlayerSummary {
    fn from(stats: &CoreStats) -> Self {
        Self {
            kills: stats.kills,
            deaths: stats.deaths,
            assists: stats.assists,
            kda: stats.kda,
            accuracy: stats.accuracy,
            score: stats.personal_score.max(stats.score),
            medal_count: stats.medals.iter().map(|m| m.count).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub team_id: u32,
    pub score: i64,
    pub outcome: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub match_id: String,
    pub map: String,
    pub playlist: String,
    pub mode: String,
    pub outcome: &'static str,
    pub duration: Option<String>,
    pub start_time: Option<String>,
    pub player: PlayerSummary,
    pub teams: Vec<TeamSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecordReport {
    pub xuid: String,
    pub matches_played: u64,
    pub wins: u64,
    pub losses: u64,
    pub ties: u64,
    /// Percentage of completed matches won
    pub win_rate: f64,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub kda: f64,
    pub accuracy: f64,
    pub time_played: Option<String>,
}

/// Build the career payload for a player
#[instrument(skip(client, handle))]
pub async fn career_report(
    client: &HaloStatsClient,
    handle: &ServiceHandle,
    xuid: &str,
) -> Result<CareerReport> {
    let (progress, table) = tokio::try_join!(
        client.career_rank(handle, xuid),
        client.career_rank_table(handle)
    )?;

    let progression = progression_from(&progress, &table);
    let next_icon_path = progression.next_rank.as_ref().and_then(|r| r.icon.clone());

    let (current_icon, next_icon) = tokio::join!(
        optional_icon(client, handle, progression.current.icon.as_deref()),
        optional_icon(client, handle, next_icon_path.as_deref())
    );

    Ok(CareerReport {
        xuid: xuid.to_string(),
        progression,
        current_icon,
        next_icon,
    })
}

async fn optional_icon(
    client: &HaloStatsClient,
    handle: &ServiceHandle,
    path: Option<&str>,
) -> Option<String> {
    match path {
        Some(path) => Some(client.icon_data_uri(handle, path).await),
        None => None,
    }
}

async fn optional_asset_name(
    client: &HaloStatsClient,
    handle: &ServiceHandle,
    kind: AssetKind,
    asset: Option<&AssetRef>,
) -> String {
    match asset {
        Some(asset) => {
            client
                .asset_name(handle, kind, &asset.asset_id, &asset.version_id)
                .await
        }
        None => UNKNOWN_ASSET.to_string(),
    }
}

/// Build the payload for the player's most recent match
#[instrument(skip(client, handle))]
pub async fn last_match_report(
    client: &HaloStatsClient,
    handle: &ServiceHandle,
    xuid: &str,
) -> Result<MatchReport> {
    let match_id = client.latest_match_id(handle, xuid).await?;
    let stats = client.match_stats(handle, &match_id).await?;

    let info = &stats.match_info;
    let (map, playlist, mode) = tokio::join!(
        optional_asset_name(client, handle, AssetKind::Map, info.map_variant.as_ref()),
        optional_asset_name(client, handle, AssetKind::Playlist, info.playlist.as_ref()),
        optional_asset_name(client, handle, AssetKind::GameVariant, info.ugc_game_variant.as_ref())
    );

    shape_match(&stats, xuid, map, playlist, mode)
}

fn shape_match(
    stats: &MatchStats,
    xuid: &str,
    map: String,
    playlist: String,
    mode: String,
) -> Result<MatchReport> {
    let player = stats
        .player(xuid)
        .ok_or_else(|| StatsError::PlayerNotInMatch(xuid.to_string(), stats.match_id.clone()))?;

    let team_stats = player
        .player_team_stats
        .iter()
        .find(|t| Some(t.team_id) == player.last_team_id)
        .or_else(|| player.player_team_stats.first());
    let summary = team_stats
        .map(|t| PlayerSummary::from(&t.stats.core_stats))
        .unwrap_or_else(|| PlayerSummary::from(&CoreStats::default()));

    let teams = stats
        .teams
        .iter()
        .map(|team| TeamSummary {
            team_id: team.team_id,
            score: team.stats.core_stats.score,
            outcome: outcome_label(team.outcome),
        })
        .collect();

    Ok(MatchReport {
        match_id: stats.match_id.clone(),
        map,
        playlist,
        mode,
        outcome: outcome_label(player.outcome),
        duration: stats.match_info.duration.clone(),
        start_time: stats.match_info.start_time.clone(),
        player: summary,
        teams,
    })
}

/// Build the matchmade service record payload
#[instrument(skip(client, handle))]
pub async fn service_record_report(
    client: &HaloStatsClient,
    handle: &ServiceHandle,
    xuid: &str,
) -> Result<ServiceRecordReport> {
    let record = client.service_record(handle, xuid).await?;
    Ok(shape_service_record(xuid, &record))
}

fn shape_service_record(xuid: &str, record: &ServiceRecord) -> ServiceRecordReport {
    let win_rate = if record.matches_completed > 0 {
        record.wins as f64 * 100.0 / record.matches_completed as f64
    } else {
        0.0
    };

    ServiceRecordReport {
        xuid: xuid.to_string(),
        matches_played: record.matches_completed,
        wins: record.wins,
        losses: record.losses,
        ties: record.ties,
        win_rate,
        kills: record.core_stats.kills,
        deaths: record.core_stats.deaths,
        assists: record.core_stats.assists,
        kda: record.core_stats.kda,
        accuracy: record.core_stats.accuracy,
        time_played: record.time_played.clone(),
    }
}
