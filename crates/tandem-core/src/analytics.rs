//! Daily analytics rollups.
//!
//! Rollups are derived writes computed from session and user data by the
//! aggregation sweep. Recomputing a day overwrites the previous value,
//! so the sweep is safe to re-run.

use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Aggregated counters for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRollup {
    pub date: NaiveDate,
    pub sessions_completed: u32,
    pub sessions_cancelled: u32,
    pub no_shows: u32,
    /// Mean vouch score across all users, at aggregation time.
    pub average_vouch_score: f64,
}

/// Store for daily rollups, keyed by date.
#[async_trait]
pub trait RollupRepository: Send + Sync {
    /// Inserts or overwrites the rollup for its date.
    async fn upsert(&self, rollup: &DailyRollup) -> Result<()>;

    /// Finds the rollup for a date.
    async fn find_by_date(&self, date: NaiveDate) -> Result<Option<DailyRollup>>;
}
