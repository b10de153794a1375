//! Race-wide per-rider aggregate.
//!
//! A [`RiderResult`] only records which stages a rider has results in; the
//! results themselves stay owned by their stages. Totals are always folded
//! fresh from those stage results, so they cannot drift from the source.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::{time, RiderId, StageId, StageResult};

/// One rider's participation in a race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiderResult {
    rider_id: RiderId,
    /// Stages with a result for this rider, in registration order
    stage_ids: Vec<StageId>,
}

impl RiderResult {
    pub fn new(rider_id: RiderId) -> Self {
        Self {
            rider_id,
            stage_ids: Vec::new(),
        }
    }

    pub fn rider_id(&self) -> RiderId {
        self.rider_id
    }

    pub fn stage_ids(&self) -> &[StageId] {
        &self.stage_ids
    }

    /// Attach a stage result. Re-adding the same stage is a no-op.
    pub fn add_stage_result(&mut self, stage_id: StageId) {
        if !self.stage_ids.contains(&stage_id) {
            self.stage_ids.push(stage_id);
        }
    }

    /// Detach a stage result. Returns whether it was attached.
    pub fn remove_stage_result(&mut self, stage_id: StageId) -> bool {
        let before = self.stage_ids.len();
        self.stage_ids.retain(|&id| id != stage_id);
        self.stage_ids.len() != before
    }

    pub fn has_stage_result(&self, stage_id: StageId) -> bool {
        self.stage_ids.contains(&stage_id)
    }

    /// An empty result must be dropped by the owning race.
    pub fn is_empty(&self) -> bool {
        self.stage_ids.is_empty()
    }

    /// Fold the attached stage results into cumulative totals.
    ///
    /// `lookup` resolves a stage ID to this rider's (classified) result there.
    pub fn totals<'a, F>(&self, lookup: F) -> RiderTotals
    where
        F: Fn(StageId) -> Option<&'a StageResult>,
    {
        RiderTotals::accumulate(
            self.rider_id,
            self.stage_ids.iter().filter_map(|&stage_id| lookup(stage_id)),
        )
    }
}

/// Cumulative values for one rider across the stages of a race.
#[derive(Debug, Clone, PartialEq)]
pub struct RiderTotals {
    pub rider_id: RiderId,
    /// Sum of adjusted elapsed times; may exceed 24 hours
    pub adjusted_elapsed_time: TimeDelta,
    /// Finish-line points
    pub points: u32,
    pub sprint_points: u32,
    pub mountain_points: u32,
    pub stage_count: usize,
}

impl RiderTotals {
    pub fn accumulate<'a, I>(rider_id: RiderId, results: I) -> Self
    where
        I: IntoIterator<Item = &'a StageResult>,
    {
        let results: Vec<&StageResult> = results.into_iter().collect();
        Self {
            rider_id,
            adjusted_elapsed_time: time::total(
                results
                    .iter()
                    .map(|r| r.adjusted_elapsed_time().unwrap_or(r.elapsed_time())),
            ),
            points: results.iter().map(|r| r.points()).sum(),
            sprint_points: results.iter().map(|r| r.sprint_points()).sum(),
            mountain_points: results.iter().map(|r| r.mountain_points()).sum(),
            stage_count: results.len(),
        }
    }

    /// Value ranked by the points classification.
    pub fn classification_points(&self) -> u32 {
        self.points + self.sprint_points
    }
}
