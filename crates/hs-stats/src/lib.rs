//! Halo Infinite stats lookups and career progression
//!
//! Every request is signed with a [`hs_auth::ServiceHandle`]. Responses are
//! normalized in [`models`] before anything else touches them, and
//! [`progression`] turns raw career rank data into a display-ready snapshot.

pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod progression;
pub mod reports;

pub use client::{AssetKind, HaloStatsClient};
pub use config::{StatsConfig, StatsEndpoints};
pub use errors::{Result, StatsError};
pub use progression::{
    HERO_RANK, Impact, ProgressionSnapshot, RankProjection, RankTable, compute_impact,
    compute_progression,
};
pub use reports::{CareerReport, MatchReport, ServiceRecordReport};
