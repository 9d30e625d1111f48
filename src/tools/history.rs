use std::collections::HashMap;
use std::sync::Arc;

use hs_stats::{Impact, ProgressionSnapshot, compute_impact};
use tokio::sync::Mutex;

/// Last progression snapshot seen per player during this process
#[derive(Debug, Clone, Default)]
pub struct ProgressionHistory {
    snapshots: Arc<Mutex<HashMap<String, ProgressionSnapshot>>>,
}

impl ProgressionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `snapshot` as the latest for `xuid`, returning the impact
    /// relative to the previous one (if any)
    pub async fn record(&self, xuid: &str, snapshot: &ProgressionSnapshot) -> Option<Impact> {
        let mut snapshots = self.snapshots.lock().await;
        let previous = snapshots.insert(xuid.to_string(), snapshot.clone());
        previous.map(|pre| compute_impact(&pre, snapshot))
    }

    pub async fn clear(&self) {
        self.snapshots.lock().await.clear();
    }
}
