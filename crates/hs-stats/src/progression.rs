use serde::Serialize;

use crate::models::{CareerProgress, RankDefinition};

/// Raw rank value reported for players at the maximum ("Hero") rank
pub const HERO_RANK: u32 = 272;

/// Ordered career rank records, looked up by rank number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankTable {
    ranks: Vec<RankDefinition>,
}

impl RankTable {
    pub fn new(ranks: Vec<RankDefinition>) -> Self {
        Self { ranks }
    }

    pub fn get(&self, rank: u32) -> Option<&RankDefinition> {
        self.ranks.iter().find(|r| r.rank == rank)
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankDefinition> {
        self.ranks.iter()
    }
}

impl From<Vec<RankDefinition>> for RankTable {
    fn from(ranks: Vec<RankDefinition>) -> Self {
        Self::new(ranks)
    }
}

/// Display fields of a single rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankProjection {
    pub rank: u32,
    pub title: String,
    pub sub_title: String,
    pub tier: String,
    pub tier_type: String,
    pub xp_required: u64,
    pub icon: Option<String>,
}

impl RankProjection {
    fn from_definition(definition: &RankDefinition) -> Self {
        Self {
            rank: definition.rank,
            title: definition.title.clone(),
            sub_title: definition.sub_title.clone(),
            tier: definition.tier.clone(),
            tier_type: definition.tier_type.clone(),
            xp_required: definition.xp_required,
            icon: definition.icon.clone(),
        }
    }

    /// Placeholder for a rank the table does not describe
    fn unknown(rank: u32) -> Self {
        Self {
            rank,
            title: String::new(),
            sub_title: String::new(),
            tier: String::new(),
            tier_type: String::new(),
            xp_required: 0,
            icon: None,
        }
    }
}

/// Derived progression view for one player at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionSnapshot {
    /// 1-based rank number
    pub current_rank: u32,
    pub is_hero: bool,
    pub current: RankProjection,
    /// XP earned inside the current rank
    pub rank_xp_earned: u64,
    pub rank_xp_required: u64,
    pub rank_progress: f64,
    pub xp_earned_to_date: u64,
    pub total_xp_required: u64,
    pub overall_progress: f64,
    pub next_rank: Option<RankProjection>,
}

/// Difference between two snapshots of the same player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Impact {
    pub xp_earned: i64,
    pub ranked_up: bool,
    pub previous_rank: u32,
    pub current_rank: u32,
}

/// Convert a raw 0-indexed rank and partial XP into a progression snapshot.
///
/// Missing table entries are tolerated: the XP requirement falls back to 0 and
/// the in-rank progress to 0 (or 1 for Hero). Hero players are always reported
/// as fully complete.
pub fn compute_progression(
    raw_rank: u32,
    partial_progress: u64,
    table: &RankTable,
) -> ProgressionSnapshot {
    let is_hero = raw_rank == HERO_RANK;
    let current_rank = if is_hero {
        HERO_RANK
    } else {
        raw_rank.saturating_add(1)
    };

    let current = table
        .get(current_rank)
        .map(RankProjection::from_definition)
        .unwrap_or_else(|| RankProjection::unknown(current_rank));
    let rank_xp_required = current.xp_required;

    let (earned_below, total_xp_required) = table.iter().fold((0u64, 0u64), |(below, total), rank| {
        let below = if rank.rank < current_rank {
            below.saturating_add(rank.xp_required)
        } else {
            below
        };
        (below, total.saturating_add(rank.xp_required))
    });
    let xp_earned_to_date = earned_below.saturating_add(partial_progress);

    let rank_progress = if is_hero {
        1.0
    } else if rank_xp_required > 0 {
        partial_progress as f64 / rank_xp_required as f64
    } else {
        0.0
    };

    let overall_progress = if is_hero {
        1.0
    } else if total_xp_required > 0 {
        xp_earned_to_date as f64 / total_xp_required as f64
    } else {
        0.0
    };

    let next_rank = if is_hero {
        None
    } else {
        table
            .get(current_rank.saturating_add(1))
            .map(RankProjection::from_definition)
    };

    ProgressionSnapshot {
        current_rank,
        is_hero,
        current,
        rank_xp_earned: partial_progress,
        rank_xp_required,
        rank_progress,
        xp_earned_to_date,
        total_xp_required,
        overall_progress,
        next_rank,
    }
}

/// Snapshot straight from a career-rank API response
///
/// A response flagged as max rank counts as Hero whatever its raw rank.
pub fn progression_from(progress: &CareerProgress, table: &RankTable) -> ProgressionSnapshot {
    let raw_rank = if progress.has_reached_max_rank {
        HERO_RANK
    } else {
        progress.rank
    };
    compute_progression(raw_rank, progress.partial_progress, table)
}

pub fn compute_impact(pre: &ProgressionSnapshot, post: &ProgressionSnapshot) -> Impact {
    let delta = i128::from(post.xp_earned_to_date) - i128::from(pre.xp_earned_to_date);
    Impact {
        xp_earned: delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64,
        ranked_up: post.current_rank > pre.current_rank,
        previous_rank: pre.current_rank,
        current_rank: post.current_rank,
    }
}
