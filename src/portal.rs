//! # Cycling Portal
//!
//! Top-level registry that owns every race, stage, team and rider.
//!
//! ## Architecture
//!
//! Entities live in ID-keyed arenas; cross-references are IDs, never
//! pointers:
//! - a [`Race`] lists its stage IDs and one [`RiderResult`](crate::RiderResult)
//!   per participating rider
//! - a [`Stage`] owns its checkpoints and every rider's
//!   [`StageResult`](crate::StageResult)
//! - a [`Team`] lists its rider IDs, a [`Rider`] names its team
//!
//! Every mutation validates first and applies second, and deletions cascade:
//! removing a stage, rider, team or race prunes the stage results and race
//! aggregates that referenced it.
//!
//! All operations take `&mut self` (reads may rebuild stale classification
//! caches), so one portal is one writer. Shared access goes through the
//! [`PORTAL`] singleton.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use log::{info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, RaceError, Result};
use crate::{
    time, Checkpoint, CheckpointId, CheckpointKind, ClimbCategory, PortalConfig, Race,
    RaceClassification, RaceId, RiderId, Stage, StageId, StageType, TeamId,
};

// ============================================================================
// Teams and Riders
// ============================================================================

/// A team and its riders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub description: String,
    pub rider_ids: Vec<RiderId>,
}

/// A rider, always registered with a team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rider {
    pub id: RiderId,
    pub team_id: TeamId,
    pub name: String,
    pub year_of_birth: i32,
}

/// A rider's recorded times in one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RiderStageTimes {
    /// Crossings at the intermediate checkpoints, in course order
    pub intermediate_times: Vec<NaiveTime>,
    /// Finish minus start
    pub elapsed_time: TimeDelta,
}

/// One row of a stage result sheet (JSON view).
#[derive(Debug, Clone, Serialize)]
pub struct StageStandingInfo {
    pub rank: u32,
    pub rider_id: RiderId,
    pub elapsed_time: String,
    pub adjusted_elapsed_time: String,
    pub points: u32,
    pub mountain_points: u32,
}

/// One row of the general classification (JSON view).
#[derive(Debug, Clone, Serialize)]
pub struct GeneralClassificationInfo {
    pub position: u32,
    pub rider_id: RiderId,
    pub total_time: String,
    pub points: u32,
    pub mountain_points: u32,
    pub stages: u32,
}

// ============================================================================
// Portal
// ============================================================================

/// The complete state of all races, teams and riders.
#[derive(Debug, Clone)]
pub struct CyclingPortal {
    pub(crate) config: PortalConfig,

    pub(crate) races: BTreeMap<RaceId, Race>,
    pub(crate) stages: BTreeMap<StageId, Stage>,
    pub(crate) teams: BTreeMap<TeamId, Team>,
    pub(crate) riders: BTreeMap<RiderId, Rider>,

    // ID counters, each starting at 1
    pub(crate) next_race_id: RaceId,
    pub(crate) next_stage_id: StageId,
    pub(crate) next_checkpoint_id: CheckpointId,
    pub(crate) next_team_id: TeamId,
    pub(crate) next_rider_id: RiderId,
}

impl CyclingPortal {
    /// Create an empty portal with default configuration.
    pub fn new() -> Self {
        Self {
            config: PortalConfig::default(),
            races: BTreeMap::new(),
            stages: BTreeMap::new(),
            teams: BTreeMap::new(),
            riders: BTreeMap::new(),
            next_race_id: 1,
            next_stage_id: 1,
            next_checkpoint_id: 1,
            next_team_id: 1,
            next_rider_id: 1,
        }
    }

    /// Create an empty portal with custom configuration.
    pub fn with_config(config: PortalConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Update configuration.
    ///
    /// A new bunch gap invalidates every stage classification.
    pub fn set_config(&mut self, config: PortalConfig) {
        for stage in self.stages.values_mut() {
            stage.set_bunch_gap_seconds(config.bunch_gap_seconds);
        }
        self.config = config;
    }

    /// Reset to an empty portal; ID counters restart at 1.
    pub fn erase_cycling_portal(&mut self) {
        let config = self.config.clone();
        *self = Self::with_config(config);
        info!("[Portal] Erased");
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn require_name(name: &str, kind: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(RaceError::illegal_name(format!("{} name cannot be empty", kind)));
        }
        Ok(())
    }

    /// Race names: non-empty, no whitespace.
    fn validate_race_name(name: &str) -> Result<()> {
        Self::require_name(name, "Race")?;
        if name.chars().any(char::is_whitespace) {
            return Err(RaceError::illegal_name("Race name cannot contain whitespace"));
        }
        Ok(())
    }

    /// Team names: non-empty, no whitespace, bounded length.
    fn validate_team_name(&self, name: &str) -> Result<()> {
        Self::require_name(name, "Team")?;
        if name.chars().count() > self.config.max_team_name_length {
            return Err(RaceError::illegal_name(format!(
                "Team name cannot be longer than {} characters",
                self.config.max_team_name_length
            )));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(RaceError::illegal_name("Team name cannot contain whitespace"));
        }
        Ok(())
    }

    fn race(&self, race_id: RaceId) -> Result<&Race> {
        self.races.get(&race_id).ok_or_not_found("race", race_id)
    }

    fn stage(&self, stage_id: StageId) -> Result<&Stage> {
        self.stages.get(&stage_id).ok_or_not_found("stage", stage_id)
    }

    fn stage_mut(&mut self, stage_id: StageId) -> Result<&mut Stage> {
        self.stages.get_mut(&stage_id).ok_or_not_found("stage", stage_id)
    }

    fn ensure_rider(&self, rider_id: RiderId) -> Result<&Rider> {
        self.riders.get(&rider_id).ok_or_not_found("rider", rider_id)
    }

    // ========================================================================
    // Races
    // ========================================================================

    pub fn get_race_ids(&self) -> Vec<RaceId> {
        self.races.keys().copied().collect()
    }

    pub fn create_race(&mut self, name: &str, description: &str) -> Result<RaceId> {
        Self::validate_race_name(name)?;
        if self.races.values().any(|r| r.name() == name) {
            return Err(RaceError::InvalidName {
                name: name.to_string(),
            });
        }

        let id = self.next_race_id;
        self.next_race_id += 1;
        self.races
            .insert(id, Race::new(id, name.to_string(), description.to_string()));
        info!("[Portal] Created race {} '{}'", id, name);
        Ok(id)
    }

    /// Human-readable summary: ID, name, description, stage count, total length.
    pub fn view_race_details(&self, race_id: RaceId) -> Result<String> {
        let race = self.race(race_id)?;
        let total_length: f64 = race
            .stage_ids()
            .iter()
            .filter_map(|id| self.stages.get(id))
            .map(|s| s.length())
            .sum();
        Ok(format!(
            "Race ID = {}\nRace name = {}\nRace description = {}\nStages in race = {}\nLength of race = {:.2} km",
            race.id(),
            race.name(),
            race.description(),
            race.stage_count(),
            total_length
        ))
    }

    pub fn remove_race_by_id(&mut self, race_id: RaceId) -> Result<()> {
        let race = self.races.remove(&race_id).ok_or_not_found("race", race_id)?;
        for stage_id in race.stage_ids() {
            self.stages.remove(stage_id);
        }
        info!(
            "[Portal] Removed race {} with {} stages",
            race_id,
            race.stage_count()
        );
        Ok(())
    }

    pub fn remove_race_by_name(&mut self, name: &str) -> Result<()> {
        let race_id = self
            .races
            .values()
            .find(|r| r.name() == name)
            .map(|r| r.id())
            .ok_or_else(|| RaceError::NameNotRecognised {
                name: name.to_string(),
            })?;
        self.remove_race_by_id(race_id)
    }

    pub fn get_number_of_stages(&self, race_id: RaceId) -> Result<usize> {
        Ok(self.race(race_id)?.stage_count())
    }

    // ========================================================================
    // Stages
    // ========================================================================

    pub fn add_stage_to_race(
        &mut self,
        race_id: RaceId,
        name: &str,
        description: &str,
        length: f64,
        start_time: NaiveDateTime,
        stage_type: StageType,
    ) -> Result<StageId> {
        self.race(race_id)?;
        Self::require_name(name, "Stage")?;

        let id = self.next_stage_id;
        let stage = Stage::new(
            id,
            race_id,
            name.to_string(),
            description.to_string(),
            length,
            start_time,
            stage_type,
            self.config.bunch_gap_seconds,
        )?;

        self.next_stage_id += 1;
        self.stages.insert(id, stage);
        if let Some(race) = self.races.get_mut(&race_id) {
            race.add_stage(id);
        }
        info!(
            "[Portal] Added {:?} stage {} '{}' to race {}",
            stage_type, id, name, race_id
        );
        Ok(id)
    }

    /// Stage IDs ordered by start time (creation order for equal starts).
    pub fn get_race_stages(&self, race_id: RaceId) -> Result<Vec<StageId>> {
        let race = self.race(race_id)?;
        let mut stages: Vec<&Stage> = race
            .stage_ids()
            .iter()
            .filter_map(|id| self.stages.get(id))
            .collect();
        stages.sort_by_key(|s| s.start_time());
        Ok(stages.iter().map(|s| s.id()).collect())
    }

    pub fn get_stage_length(&self, stage_id: StageId) -> Result<f64> {
        Ok(self.stage(stage_id)?.length())
    }

    /// Remove a stage with all its results.
    ///
    /// Riders left without any result in the race drop out of its
    /// classifications.
    pub fn remove_stage_by_id(&mut self, stage_id: StageId) -> Result<()> {
        let stage = self.stages.remove(&stage_id).ok_or_not_found("stage", stage_id)?;
        let pruned = match self.races.get_mut(&stage.race_id()) {
            Some(race) => race.remove_stage(stage_id),
            None => Vec::new(),
        };
        info!(
            "[Portal] Removed stage {} ({} results, {} riders left race {})",
            stage_id,
            stage.result_count(),
            pruned.len(),
            stage.race_id()
        );
        Ok(())
    }

    // ========================================================================
    // Checkpoints
    // ========================================================================

    fn add_checkpoint(
        &mut self,
        stage_id: StageId,
        location: f64,
        kind: CheckpointKind,
    ) -> Result<CheckpointId> {
        let id = self.next_checkpoint_id;
        self.stage_mut(stage_id)?.add_checkpoint(Checkpoint {
            id,
            stage_id,
            location,
            kind,
        })?;
        self.next_checkpoint_id += 1;
        info!(
            "[Portal] Added checkpoint {} at {} km to stage {}",
            id, location, stage_id
        );
        Ok(id)
    }

    pub fn add_categorized_climb_to_stage(
        &mut self,
        stage_id: StageId,
        location: f64,
        category: ClimbCategory,
        average_gradient: f64,
        length: f64,
    ) -> Result<CheckpointId> {
        self.add_checkpoint(
            stage_id,
            location,
            CheckpointKind::Climb {
                category,
                average_gradient,
                length,
            },
        )
    }

    pub fn add_intermediate_sprint_to_stage(
        &mut self,
        stage_id: StageId,
        location: f64,
    ) -> Result<CheckpointId> {
        self.add_checkpoint(stage_id, location, CheckpointKind::Sprint)
    }

    pub fn remove_checkpoint(&mut self, checkpoint_id: CheckpointId) -> Result<()> {
        let stage = self
            .stages
            .values_mut()
            .find(|s| s.has_checkpoint(checkpoint_id))
            .ok_or_not_found("checkpoint", checkpoint_id)?;
        stage.remove_checkpoint(checkpoint_id)?;
        info!(
            "[Portal] Removed checkpoint {} from stage {}",
            checkpoint_id,
            stage.id()
        );
        Ok(())
    }

    /// Freeze a stage's course and open it for results.
    pub fn conclude_stage_preparation(&mut self, stage_id: StageId) -> Result<()> {
        self.stage_mut(stage_id)?.conclude_preparation()?;
        info!("[Portal] Stage {} is waiting for results", stage_id);
        Ok(())
    }

    /// Checkpoint IDs in course order.
    pub fn get_stage_checkpoints(&self, stage_id: StageId) -> Result<Vec<CheckpointId>> {
        Ok(self.stage(stage_id)?.checkpoint_ids())
    }

    // ========================================================================
    // Teams and Riders
    // ========================================================================

    pub fn create_team(&mut self, name: &str, description: &str) -> Result<TeamId> {
        self.validate_team_name(name)?;
        if self.teams.values().any(|t| t.name == name) {
            return Err(RaceError::InvalidName {
                name: name.to_string(),
            });
        }

        let id = self.next_team_id;
        self.next_team_id += 1;
        self.teams.insert(
            id,
            Team {
                id,
                name: name.to_string(),
                description: description.to_string(),
                rider_ids: Vec::new(),
            },
        );
        info!("[Portal] Created team {} '{}'", id, name);
        Ok(id)
    }

    /// Remove a team and all of its riders.
    pub fn remove_team(&mut self, team_id: TeamId) -> Result<()> {
        let rider_ids = self
            .teams
            .get(&team_id)
            .ok_or_not_found("team", team_id)?
            .rider_ids
            .clone();
        for rider_id in rider_ids {
            self.remove_rider(rider_id)?;
        }
        self.teams.remove(&team_id);
        info!("[Portal] Removed team {}", team_id);
        Ok(())
    }

    pub fn get_teams(&self) -> Vec<TeamId> {
        self.teams.keys().copied().collect()
    }

    pub fn get_team_riders(&self, team_id: TeamId) -> Result<Vec<RiderId>> {
        Ok(self
            .teams
            .get(&team_id)
            .ok_or_not_found("team", team_id)?
            .rider_ids
            .clone())
    }

    pub fn create_rider(
        &mut self,
        team_id: TeamId,
        name: &str,
        year_of_birth: i32,
    ) -> Result<RiderId> {
        if name.trim().is_empty() {
            return Err(RaceError::IllegalArgument {
                message: "rider name cannot be empty".to_string(),
            });
        }
        if year_of_birth < self.config.min_year_of_birth {
            return Err(RaceError::IllegalArgument {
                message: format!(
                    "year of birth must be at least {}, got {}",
                    self.config.min_year_of_birth, year_of_birth
                ),
            });
        }
        let team = self.teams.get_mut(&team_id).ok_or_not_found("team", team_id)?;

        let id = self.next_rider_id;
        self.next_rider_id += 1;
        team.rider_ids.push(id);
        self.riders.insert(
            id,
            Rider {
                id,
                team_id,
                name: name.to_string(),
                year_of_birth,
            },
        );
        info!("[Portal] Created rider {} in team {}", id, team_id);
        Ok(id)
    }

    /// Remove a rider together with every stage result they hold.
    pub fn remove_rider(&mut self, rider_id: RiderId) -> Result<()> {
        let rider = self.riders.remove(&rider_id).ok_or_not_found("rider", rider_id)?;

        let mut removed = 0;
        for stage in self.stages.values_mut() {
            if stage.remove_result(rider_id) {
                removed += 1;
                if let Some(race) = self.races.get_mut(&stage.race_id()) {
                    race.remove_stage_result(rider_id, stage.id());
                }
            }
        }
        if let Some(team) = self.teams.get_mut(&rider.team_id) {
            team.rider_ids.retain(|&id| id != rider_id);
        }
        info!(
            "[Portal] Removed rider {} and {} stage results",
            rider_id, removed
        );
        Ok(())
    }

    // ========================================================================
    // Stage Results
    // ========================================================================

    /// Register a rider's crossing times: start, each checkpoint in course
    /// order, finish.
    pub fn register_stage_result(
        &mut self,
        stage_id: StageId,
        rider_id: RiderId,
        checkpoint_times: &[NaiveTime],
    ) -> Result<()> {
        self.ensure_rider(rider_id)?;
        let race_id = self.stage(stage_id)?.race_id();
        self.race(race_id)?;

        self.stage_mut(stage_id)?
            .register_result(rider_id, checkpoint_times.to_vec())?;
        if let Some(race) = self.races.get_mut(&race_id) {
            race.add_stage_result(rider_id, stage_id);
        }
        info!(
            "[Portal] Registered result for rider {} in stage {}",
            rider_id, stage_id
        );
        Ok(())
    }

    /// Delete a rider's result in a stage. Deleting a missing result is a no-op.
    pub fn delete_stage_result(&mut self, stage_id: StageId, rider_id: RiderId) -> Result<()> {
        self.ensure_rider(rider_id)?;
        let stage = self.stage_mut(stage_id)?;
        let race_id = stage.race_id();
        if !stage.remove_result(rider_id) {
            warn!(
                "[Portal] No result for rider {} in stage {} to delete",
                rider_id, stage_id
            );
            return Ok(());
        }
        if let Some(race) = self.races.get_mut(&race_id) {
            race.remove_stage_result(rider_id, stage_id);
        }
        info!(
            "[Portal] Deleted result for rider {} in stage {}",
            rider_id, stage_id
        );
        Ok(())
    }

    /// Intermediate times and elapsed time, `None` when the rider has no result.
    pub fn get_rider_results_in_stage(
        &self,
        stage_id: StageId,
        rider_id: RiderId,
    ) -> Result<Option<RiderStageTimes>> {
        self.ensure_rider(rider_id)?;
        Ok(self
            .stage(stage_id)?
            .result_for(rider_id)
            .map(|r| RiderStageTimes {
                intermediate_times: r.intermediate_times().to_vec(),
                elapsed_time: r.elapsed_time(),
            }))
    }

    pub fn get_rider_adjusted_elapsed_time_in_stage(
        &mut self,
        stage_id: StageId,
        rider_id: RiderId,
    ) -> Result<Option<TimeDelta>> {
        self.ensure_rider(rider_id)?;
        let stage = self.stage_mut(stage_id)?;
        stage.ensure_classified();
        Ok(stage
            .result_for(rider_id)
            .and_then(|r| r.adjusted_elapsed_time()))
    }

    /// Rider IDs by stage rank.
    pub fn get_stage_ranking(&mut self, stage_id: StageId) -> Result<Vec<RiderId>> {
        Ok(self.stage_mut(stage_id)?.ranking())
    }

    /// Adjusted elapsed times, parallel to [`CyclingPortal::get_stage_ranking`].
    pub fn get_adjusted_elapsed_times(&mut self, stage_id: StageId) -> Result<Vec<TimeDelta>> {
        Ok(self.stage_mut(stage_id)?.adjusted_elapsed_times())
    }

    /// Finish plus intermediate sprint points, parallel to the stage ranking.
    pub fn get_stage_points(&mut self, stage_id: StageId) -> Result<Vec<u32>> {
        Ok(self.stage_mut(stage_id)?.points())
    }

    /// Intermediate sprint points only, parallel to the stage ranking.
    pub fn get_stage_sprint_points(&mut self, stage_id: StageId) -> Result<Vec<u32>> {
        Ok(self.stage_mut(stage_id)?.sprint_points())
    }

    /// Mountain points, parallel to the stage ranking.
    pub fn get_stage_mountain_points(&mut self, stage_id: StageId) -> Result<Vec<u32>> {
        Ok(self.stage_mut(stage_id)?.mountain_points())
    }

    /// Stage result sheet as JSON.
    pub fn get_stage_ranking_json(&mut self, stage_id: StageId) -> Result<String> {
        let rows: Vec<StageStandingInfo> = self
            .stage_mut(stage_id)?
            .ranked_results()
            .iter()
            .map(|r| StageStandingInfo {
                rank: r.rank(),
                rider_id: r.rider_id(),
                elapsed_time: time::format_duration(r.elapsed_time()),
                adjusted_elapsed_time: time::format_duration(
                    r.adjusted_elapsed_time().unwrap_or(r.elapsed_time()),
                ),
                points: r.total_points(),
                mountain_points: r.mountain_points(),
            })
            .collect();
        Ok(serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string()))
    }

    // ========================================================================
    // Race Classifications
    // ========================================================================

    /// Fold every participating rider's classified stage results.
    pub fn race_classification(&mut self, race_id: RaceId) -> Result<RaceClassification> {
        let stage_ids = self.race(race_id)?.stage_ids().to_vec();
        for stage_id in &stage_ids {
            if let Some(stage) = self.stages.get_mut(stage_id) {
                stage.ensure_classified();
            }
        }

        let race = self.race(race_id)?;
        let stages = &self.stages;
        let totals = race
            .results()
            .iter()
            .map(|result| {
                let rider_id = result.rider_id();
                result.totals(|stage_id| stages.get(&stage_id)?.result_for(rider_id))
            })
            .collect();
        Ok(RaceClassification::new(totals))
    }

    /// Rider IDs and cumulative adjusted times, in general classification order.
    pub fn get_general_classification(
        &mut self,
        race_id: RaceId,
    ) -> Result<(Vec<RiderId>, Vec<TimeDelta>)> {
        Ok(self.race_classification(race_id)?.general_classification())
    }

    pub fn get_points_classification(&mut self, race_id: RaceId) -> Result<Vec<RiderId>> {
        Ok(self.race_classification(race_id)?.points_classification())
    }

    pub fn get_mountain_classification(&mut self, race_id: RaceId) -> Result<Vec<RiderId>> {
        Ok(self.race_classification(race_id)?.mountain_classification())
    }

    /// Cumulative points in general classification order.
    pub fn get_riders_points_in_race(&mut self, race_id: RaceId) -> Result<Vec<u32>> {
        Ok(self.race_classification(race_id)?.points_in_general_order())
    }

    /// Cumulative mountain points in general classification order.
    pub fn get_riders_mountain_points_in_race(&mut self, race_id: RaceId) -> Result<Vec<u32>> {
        Ok(self
            .race_classification(race_id)?
            .mountain_points_in_general_order())
    }

    /// General classification as JSON.
    pub fn get_general_classification_json(&mut self, race_id: RaceId) -> Result<String> {
        let classification = self.race_classification(race_id)?;
        let rows: Vec<GeneralClassificationInfo> = classification
            .general()
            .into_iter()
            .enumerate()
            .map(|(i, t)| GeneralClassificationInfo {
                position: i as u32 + 1,
                rider_id: t.rider_id,
                total_time: time::format_duration(t.adjusted_elapsed_time),
                points: t.classification_points(),
                mountain_points: t.mountain_points,
                stages: t.stage_count as u32,
            })
            .collect();
        Ok(serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string()))
    }
}

impl Default for CyclingPortal {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Global Singleton
// ============================================================================

/// Global portal instance.
///
/// The mutex serializes every operation, so lazy reclassification never
/// races with a registration.
pub static PORTAL: Lazy<Mutex<CyclingPortal>> = Lazy::new(|| Mutex::new(CyclingPortal::new()));

/// Get a lock on the global portal.
pub fn with_portal<F, R>(f: F) -> R
where
    F: FnOnce(&mut CyclingPortal) -> R,
{
    let mut portal = PORTAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut portal)
}

// ============================================================================
// Tests
// ============================================================================
