use std::time::Duration;

/// Halo Infinite service hosts
pub mod endpoints {
    pub const ECONOMY: &str = "https://economy.svc.halowaypoint.com";
    pub const GAMECMS: &str = "https://gamecms-hacs.svc.halowaypoint.com";
    pub const HALOSTATS: &str = "https://halostats.svc.halowaypoint.com";
    pub const DISCOVERY: &str = "https://discovery-infiniteugc.svc.halowaypoint.com";
    pub const PEOPLEHUB: &str = "https://peoplehub.xboxlive.com";
}

/// Reward track holding the career rank
pub const CAREER_TRACK: &str = "careerrank1";

/// CMS file with the career rank definitions
pub const CAREER_RANK_TABLE_PATH: &str = "Progression/file/RewardTracks/CareerRanks/careerRank1.json";

/// Endpoint set used by [`crate::HaloStatsClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsEndpoints {
    pub economy: String,
    pub gamecms: String,
    pub halostats: String,
    pub discovery: String,
    pub peoplehub: String,
}

impl Default for StatsEndpoints {
    fn default() -> Self {
        Self {
            economy: endpoints::ECONOMY.to_string(),
            gamecms: endpoints::GAMECMS.to_string(),
            halostats: endpoints::HALOSTATS.to_string(),
            discovery: endpoints::DISCOVERY.to_string(),
            peoplehub: endpoints::PEOPLEHUB.to_string(),
        }
    }
}

impl StatsEndpoints {
    /// Point every host at one base URL (used with a mock server)
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            economy: base.clone(),
            gamecms: base.clone(),
            halostats: base.clone(),
            discovery: base.clone(),
            peoplehub: base,
        }
    }
}

/// Configuration for HaloStatsClient
#[derive(Debug, Clone)]
pub struct StatsConfig {
    pub endpoints: StatsEndpoints,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            endpoints: StatsEndpoints::default(),
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            user_agent: "halo-stats".to_string(),
        }
    }
}
