//! Canonical shapes of the Halo API responses.
//!
//! Upstream services mix PascalCase and camelCase keys. Every response goes
//! through [`decode`], which rewrites object keys to PascalCase before
//! deserializing, so the rest of the crate only ever sees one shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::Result;

fn pascal_key(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Rewrite every object key to start with an uppercase letter
pub fn pascal_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (pascal_key(&key), pascal_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(pascal_keys).collect()),
        other => other,
    }
}

/// Normalize key casing, then deserialize into the canonical type
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(pascal_keys(value))?)
}

/// Accept numbers that arrive either as JSON numbers or numeric strings
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Float(f64),
        Text(String),
    }

    match Number::deserialize(deserializer)? {
        Number::Float(value) => Ok(value),
        Number::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ─── Career rank ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CareerRankResponse {
    pub current_progress: CareerProgress,
}

/// Raw career progress; `rank` is 0-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CareerProgress {
    pub rank: u32,
    #[serde(default)]
    pub partial_progress: u64,
    #[serde(default)]
    pub has_reached_max_rank: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocalizedText {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRank {
    rank: u32,
    #[serde(default)]
    rank_title: LocalizedText,
    #[serde(default)]
    rank_sub_title: LocalizedText,
    #[serde(default)]
    rank_tier: LocalizedText,
    #[serde(default)]
    tier_type: String,
    #[serde(default)]
    rank_large_icon: Option<String>,
    #[serde(default)]
    rank_icon: Option<String>,
    #[serde(default)]
    xp_required_for_rank: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RankTableResponse {
    #[serde(default)]
    ranks: Vec<RawRank>,
}

/// One career rank record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankDefinition {
    /// 1-based rank number
    pub rank: u32,
    pub title: String,
    pub sub_title: String,
    pub tier: String,
    pub tier_type: String,
    pub xp_required: u64,
    pub icon: Option<String>,
}

impl RankTableResponse {
    pub fn into_definitions(self) -> Vec<RankDefinition> {
        self.ranks
            .into_iter()
            .map(|raw| RankDefinition {
                rank: raw.rank,
                title: raw.rank_title.value,
                sub_title: raw.rank_sub_title.value,
                tier: raw.rank_tier.value,
                tier_type: raw.tier_type,
                xp_required: raw.xp_required_for_rank,
                icon: raw.rank_large_icon.or(raw.rank_icon),
            })
            .collect()
    }
}

// ─── Matches ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchHistoryResponse {
    #[serde(default)]
    pub results: Vec<MatchHistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchHistoryEntry {
    pub match_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssetRef {
    pub asset_id: String,
    pub version_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchInfo {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub map_variant: Option<AssetRef>,
    #[serde(default)]
    pub ugc_game_variant: Option<AssetRef>,
    #[serde(default)]
    pub playlist: Option<AssetRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Medal {
    pub name_id: u64,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CoreStats {
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub personal_score: i64,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(rename = "KDA", alias = "Kda", default, deserialize_with = "lenient_f64")]
    pub kda: f64,
    #[serde(default)]
    pub shots_fired: u64,
    #[serde(default)]
    pub shots_hit: u64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub accuracy: f64,
    #[serde(default)]
    pub medals: Vec<Medal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatsBlock {
    #[serde(default)]
    pub core_stats: CoreStats,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TeamStats {
    pub team_id: u32,
    #[serde(default)]
    pub outcome: u32,
    #[serde(default)]
    pub stats: StatsBlock,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerTeamStats {
    pub team_id: u32,
    #[serde(default)]
    pub stats: StatsBlock,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerStats {
    /// Formatted as `xuid(<number>)` for human players
    pub player_id: String,
    #[serde(default)]
    pub last_team_id: Option<u32>,
    #[serde(default)]
    pub outcome: u32,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub player_team_stats: Vec<PlayerTeamStats>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchStats {
    pub match_id: String,
    pub match_info: MatchInfo,
    #[serde(default)]
    pub teams: Vec<TeamStats>,
    #[serde(default)]
    pub players: Vec<PlayerStats>,
}

impl MatchStats {
    pub fn player(&self, xuid: &str) -> Option<&PlayerStats> {
        let player_id = format!("xuid({})", xuid);
        self.players.iter().find(|p| p.player_id == player_id)
    }
}

/// Human-readable match outcome
pub fn outcome_label(outcome: u32) -> &'static str {
    match outcome {
        1 => "Tie",
        2 => "Win",
        3 => "Loss",
        4 => "Left",
        _ => "Unknown",
    }
}

// ─── Service record ──────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRecord {
    #[serde(default)]
    pub time_played: Option<String>,
    #[serde(default)]
    pub matches_completed: u64,
    #[serde(default)]
    pub wins: u64,
    #[serde(default)]
    pub losses: u64,
    #[serde(default)]
    pub ties: u64,
    #[serde(default)]
    pub core_stats: CoreStats,
}

// ─── Assets and people ───────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssetMetadata {
    #[serde(default)]
    pub public_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeopleSearchResponse {
    #[serde(default)]
    pub people: Vec<Person>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Person {
    pub xuid: String,
    #[serde(default)]
    pub gamertag: Option<String>,
    #[serde(default)]
    pub modern_gamertag: Option<String>,
}

impl Person {
    pub fn matches_gamertag(&self, gamertag: &str) -> bool {
        [&self.gamertag, &self.modern_gamertag]
            .into_iter()
            .flatten()
            .any(|candidate| candidate.eq_ignore_ascii_case(gamertag))
    }
}
