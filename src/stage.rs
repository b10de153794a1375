//! # Stage
//!
//! A stage owns its course (ordered checkpoints) and every rider's
//! [`StageResult`]. Ranking and checkpoint points are derived state: every
//! mutation bumps `version`, and reads rebuild whichever cache was computed
//! for an older version before answering.

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use log::debug;

use crate::classification;
use crate::error::{OptionExt, RaceError, Result};
use crate::{
    Checkpoint, CheckpointId, RaceId, RiderId, StageId, StageResult, StageState, StageType,
};

/// A single stage of a race.
#[derive(Debug, Clone)]
pub struct Stage {
    id: StageId,
    race_id: RaceId,
    name: String,
    description: String,
    /// Kilometers
    length: f64,
    start_time: NaiveDateTime,
    stage_type: StageType,
    state: StageState,

    /// Sorted by location (course order)
    checkpoints: Vec<Checkpoint>,
    /// Registration order
    results: Vec<StageResult>,

    // Invalidation token, bumped on every mutation
    version: u64,
    ranked_version: Option<u64>,
    points_version: Option<u64>,
    /// Finishing order as indices into `results`
    ranking: Vec<usize>,

    bunch_gap_seconds: i64,
}

impl Stage {
    /// Create a stage under construction.
    ///
    /// Fails with [`RaceError::InvalidLength`] unless `length` is positive.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: StageId,
        race_id: RaceId,
        name: String,
        description: String,
        length: f64,
        start_time: NaiveDateTime,
        stage_type: StageType,
        bunch_gap_seconds: i64,
    ) -> Result<Self> {
        if !(length.is_finite() && length > 0.0) {
            return Err(RaceError::InvalidLength { length });
        }
        Ok(Self {
            id,
            race_id,
            name,
            description,
            length,
            start_time,
            stage_type,
            state: StageState::UnderConstruction,
            checkpoints: Vec::new(),
            results: Vec::new(),
            version: 0,
            ranked_version: None,
            points_version: None,
            ranking: Vec::new(),
            bunch_gap_seconds,
        })
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn race_id(&self) -> RaceId {
        self.race_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    pub fn stage_type(&self) -> StageType {
        self.stage_type
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// Current invalidation token.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn invalidate(&mut self) {
        self.version += 1;
    }

    pub(crate) fn set_bunch_gap_seconds(&mut self, seconds: i64) {
        if self.bunch_gap_seconds != seconds {
            self.bunch_gap_seconds = seconds;
            self.invalidate();
        }
    }

    // ========================================================================
    // Course
    // ========================================================================

    /// Checkpoints in course order.
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn checkpoint_ids(&self) -> Vec<CheckpointId> {
        self.checkpoints.iter().map(|c| c.id).collect()
    }

    pub fn has_checkpoint(&self, checkpoint_id: CheckpointId) -> bool {
        self.checkpoints.iter().any(|c| c.id == checkpoint_id)
    }

    /// Number of crossing times a result must carry (start, checkpoints, finish).
    pub fn expected_time_count(&self) -> usize {
        self.checkpoints.len() + 2
    }

    /// Insert a checkpoint at its course position.
    ///
    /// Checkpoints at the same location keep insertion order.
    pub fn add_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if self.state != StageState::UnderConstruction {
            return Err(RaceError::stage_state(format!(
                "stage {} is no longer under construction",
                self.id
            )));
        }
        if !self.stage_type.allows_checkpoints() {
            return Err(RaceError::InvalidStageType {
                message: format!("stage {} is a time trial", self.id),
            });
        }
        if !(checkpoint.location > 0.0 && checkpoint.location <= self.length) {
            return Err(RaceError::InvalidLocation {
                stage_id: self.id,
                location: checkpoint.location,
                length: self.length,
            });
        }

        let position = self
            .checkpoints
            .partition_point(|c| c.location <= checkpoint.location);
        self.checkpoints.insert(position, checkpoint);
        self.invalidate();
        Ok(())
    }

    pub fn remove_checkpoint(&mut self, checkpoint_id: CheckpointId) -> Result<Checkpoint> {
        if self.state != StageState::UnderConstruction {
            return Err(RaceError::stage_state(format!(
                "stage {} is no longer under construction",
                self.id
            )));
        }
        let position = self
            .checkpoints
            .iter()
            .position(|c| c.id == checkpoint_id)
            .ok_or_not_found("checkpoint", checkpoint_id)?;
        let removed = self.checkpoints.remove(position);
        self.invalidate();
        Ok(removed)
    }

    /// Freeze the course and open the stage for results.
    pub fn conclude_preparation(&mut self) -> Result<()> {
        if self.state == StageState::WaitingForResults {
            return Err(RaceError::stage_state(format!(
                "stage {} is already waiting for results",
                self.id
            )));
        }
        self.state = StageState::WaitingForResults;
        Ok(())
    }

    // ========================================================================
    // Results
    // ========================================================================

    /// Register a rider's crossing times.
    ///
    /// Nothing changes unless every check passes.
    pub fn register_result(&mut self, rider_id: RiderId, times: Vec<NaiveTime>) -> Result<()> {
        if self.state != StageState::WaitingForResults {
            return Err(RaceError::stage_state(format!(
                "stage {} is not waiting for results",
                self.id
            )));
        }
        if self.has_result(rider_id) {
            return Err(RaceError::DuplicatedResult {
                stage_id: self.id,
                rider_id,
            });
        }
        let result = StageResult::new(rider_id, times, self.expected_time_count())?;
        self.results.push(result);
        self.invalidate();
        Ok(())
    }

    /// Re-attach a stored result regardless of stage state.
    pub(crate) fn restore_result(
        &mut self,
        rider_id: RiderId,
        times: Vec<NaiveTime>,
    ) -> Result<()> {
        if self.has_result(rider_id) {
            return Err(RaceError::DuplicatedResult {
                stage_id: self.id,
                rider_id,
            });
        }
        let result = StageResult::new(rider_id, times, self.expected_time_count())?;
        self.results.push(result);
        self.invalidate();
        Ok(())
    }

    pub(crate) fn restore_state(&mut self, state: StageState, checkpoints: Vec<Checkpoint>) {
        self.state = state;
        self.checkpoints = checkpoints;
        self.invalidate();
    }

    /// Remove a rider's result. Returns whether one existed.
    pub fn remove_result(&mut self, rider_id: RiderId) -> bool {
        match self.results.iter().position(|r| r.rider_id() == rider_id) {
            Some(position) => {
                self.results.remove(position);
                self.invalidate();
                true
            }
            None => false,
        }
    }

    pub fn has_result(&self, rider_id: RiderId) -> bool {
        self.results.iter().any(|r| r.rider_id() == rider_id)
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Raw results in registration order; derived fields may be stale.
    pub fn results(&self) -> &[StageResult] {
        &self.results
    }

    /// Riders with a result, in registration order.
    pub fn rider_ids(&self) -> Vec<RiderId> {
        self.results.iter().map(|r| r.rider_id()).collect()
    }

    /// A rider's result with derived fields as of the last classification.
    ///
    /// Call [`Stage::ensure_classified`] first for fresh values.
    pub fn result_for(&self, rider_id: RiderId) -> Option<&StageResult> {
        self.results.iter().find(|r| r.rider_id() == rider_id)
    }

    // ========================================================================
    // Classification
    // ========================================================================

    /// True when both caches match the current version.
    pub fn is_classified(&self) -> bool {
        self.ranked_version == Some(self.version) && self.points_version == Some(self.version)
    }

    /// Ensure finishing ranks, adjusted times and finish points are current.
    fn ensure_ranking(&mut self) {
        if self.ranked_version == Some(self.version) {
            return;
        }
        debug!(
            "[Stage] Ranking stage {} ({} results, version {})",
            self.id,
            self.results.len(),
            self.version
        );
        self.ranking = classification::apply_finish_classification(
            &mut self.results,
            self.stage_type,
            self.bunch_gap_seconds,
        );
        self.ranked_version = Some(self.version);
    }

    /// Ensure sprint and mountain points are current.
    fn ensure_checkpoint_points(&mut self) {
        if self.points_version == Some(self.version) {
            return;
        }
        debug!(
            "[Stage] Scoring {} checkpoints on stage {} (version {})",
            self.checkpoints.len(),
            self.id,
            self.version
        );
        classification::apply_checkpoint_points(&mut self.results, &self.checkpoints);
        self.points_version = Some(self.version);
    }

    /// Bring every derived field up to date.
    pub fn ensure_classified(&mut self) {
        self.ensure_ranking();
        self.ensure_checkpoint_points();
    }

    /// Results in finishing order with fresh derived fields.
    pub fn ranked_results(&mut self) -> Vec<&StageResult> {
        self.ensure_classified();
        self.ranking.iter().map(|&i| &self.results[i]).collect()
    }

    /// Rider IDs by rank.
    pub fn ranking(&mut self) -> Vec<RiderId> {
        self.ranked_results().iter().map(|r| r.rider_id()).collect()
    }

    /// Adjusted elapsed times, parallel to [`Stage::ranking`].
    pub fn adjusted_elapsed_times(&mut self) -> Vec<TimeDelta> {
        self.ranked_results()
            .iter()
            .map(|r| r.adjusted_elapsed_time().unwrap_or(r.elapsed_time()))
            .collect()
    }

    /// Finish plus sprint points, parallel to [`Stage::ranking`].
    pub fn points(&mut self) -> Vec<u32> {
        self.ranked_results().iter().map(|r| r.total_points()).collect()
    }

    /// Sprint points only, parallel to [`Stage::ranking`].
    pub fn sprint_points(&mut self) -> Vec<u32> {
        self.ranked_results().iter().map(|r| r.sprint_points()).collect()
    }

    /// Mountain points, parallel to [`Stage::ranking`].
    pub fn mountain_points(&mut self) -> Vec<u32> {
        self.ranked_results().iter().map(|r| r.mountain_points()).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
