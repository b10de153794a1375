//! # Race
//!
//! A race groups stages and keeps one [`RiderResult`] per participating
//! rider. [`RaceClassification`] sorts the folded totals into the race-wide
//! general, points and mountain classifications.
//!
//! Ties in every race-wide classification go to the lower rider ID.

use std::cmp::Reverse;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::{RaceId, RiderId, RiderResult, RiderTotals, StageId};

/// A multi-stage race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Race {
    id: RaceId,
    name: String,
    description: String,
    /// Creation order
    stage_ids: Vec<StageId>,
    /// First-registration order; never holds an empty result
    results: Vec<RiderResult>,
}

impl Race {
    pub fn new(id: RaceId, name: String, description: String) -> Self {
        Self {
            id,
            name,
            description,
            stage_ids: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn id(&self) -> RaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn stage_ids(&self) -> &[StageId] {
        &self.stage_ids
    }

    pub fn stage_count(&self) -> usize {
        self.stage_ids.len()
    }

    pub fn add_stage(&mut self, stage_id: StageId) {
        if !self.stage_ids.contains(&stage_id) {
            self.stage_ids.push(stage_id);
        }
    }

    /// Drop a stage and detach it from every rider result, pruning any
    /// result left empty. Returns the riders whose result was pruned.
    pub fn remove_stage(&mut self, stage_id: StageId) -> Vec<RiderId> {
        self.stage_ids.retain(|&id| id != stage_id);
        for result in &mut self.results {
            result.remove_stage_result(stage_id);
        }
        self.prune_empty()
    }

    // ========================================================================
    // Rider Results
    // ========================================================================

    pub fn results(&self) -> &[RiderResult] {
        &self.results
    }

    pub fn rider_has_result(&self, rider_id: RiderId) -> bool {
        self.results.iter().any(|r| r.rider_id() == rider_id)
    }

    pub fn result_for(&self, rider_id: RiderId) -> Option<&RiderResult> {
        self.results.iter().find(|r| r.rider_id() == rider_id)
    }

    /// Participating riders in first-registration order.
    pub fn rider_ids(&self) -> Vec<RiderId> {
        self.results.iter().map(|r| r.rider_id()).collect()
    }

    /// Attach a stage result, creating the rider's result on first use.
    pub fn add_stage_result(&mut self, rider_id: RiderId, stage_id: StageId) {
        match self.results.iter_mut().find(|r| r.rider_id() == rider_id) {
            Some(result) => result.add_stage_result(stage_id),
            None => {
                let mut result = RiderResult::new(rider_id);
                result.add_stage_result(stage_id);
                self.results.push(result);
            }
        }
    }

    /// Detach a stage result; the rider's result is dropped once empty.
    pub fn remove_stage_result(&mut self, rider_id: RiderId, stage_id: StageId) {
        if let Some(result) = self.results.iter_mut().find(|r| r.rider_id() == rider_id) {
            result.remove_stage_result(stage_id);
        }
        self.prune_empty();
    }

    fn prune_empty(&mut self) -> Vec<RiderId> {
        let pruned: Vec<RiderId> = self
            .results
            .iter()
            .filter(|r| r.is_empty())
            .map(|r| r.rider_id())
            .collect();
        self.results.retain(|r| !r.is_empty());
        pruned
    }
}

// ============================================================================
// Race Classification
// ============================================================================

/// Race-wide classifications over a snapshot of rider totals.
#[derive(Debug, Clone)]
pub struct RaceClassification {
    totals: Vec<RiderTotals>,
}

impl RaceClassification {
    pub fn new(totals: Vec<RiderTotals>) -> Self {
        Self { totals }
    }

    pub fn totals(&self) -> &[RiderTotals] {
        &self.totals
    }

    /// Totals ordered by cumulative adjusted time, then rider ID.
    pub fn general(&self) -> Vec<&RiderTotals> {
        let mut ordered: Vec<&RiderTotals> = self.totals.iter().collect();
        ordered.sort_by_key(|t| (t.adjusted_elapsed_time, t.rider_id));
        ordered
    }

    /// Rider IDs and cumulative times, parallel, in general classification order.
    pub fn general_classification(&self) -> (Vec<RiderId>, Vec<TimeDelta>) {
        self.general()
            .into_iter()
            .map(|t| (t.rider_id, t.adjusted_elapsed_time))
            .unzip()
    }

    /// Rider IDs by finish plus sprint points, highest first.
    pub fn points_classification(&self) -> Vec<RiderId> {
        let mut ordered: Vec<&RiderTotals> = self.totals.iter().collect();
        ordered.sort_by_key(|t| (Reverse(t.classification_points()), t.rider_id));
        ordered.into_iter().map(|t| t.rider_id).collect()
    }

    /// Rider IDs by mountain points, highest first.
    pub fn mountain_classification(&self) -> Vec<RiderId> {
        let mut ordered: Vec<&RiderTotals> = self.totals.iter().collect();
        ordered.sort_by_key(|t| (Reverse(t.mountain_points), t.rider_id));
        ordered.into_iter().map(|t| t.rider_id).collect()
    }

    /// Points classification values in general classification order.
    pub fn points_in_general_order(&self) -> Vec<u32> {
        self.general()
            .into_iter()
            .map(|t| t.classification_points())
            .collect()
    }

    /// Mountain points in general classification order.
    pub fn mountain_points_in_general_order(&self) -> Vec<u32> {
        self.general().into_iter().map(|t| t.mountain_points).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
