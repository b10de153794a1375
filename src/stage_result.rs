//! One rider's checkpoint crossings for one stage.
//!
//! The crossing times are immutable once registered. Rank, adjusted time and
//! points are derived by the owning [`Stage`](crate::Stage) and written back
//! here whenever its classification caches are rebuilt.

use chrono::{NaiveTime, TimeDelta};

use crate::error::{RaceError, Result};
use crate::time;
use crate::RiderId;

/// Raw and derived performance of a rider in a single stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    rider_id: RiderId,
    /// Start, each intermediate checkpoint in course order, finish
    checkpoint_times: Vec<NaiveTime>,
    elapsed_time: TimeDelta,

    // Derived, owned by stage classification
    rank: u32,
    adjusted_elapsed_time: Option<TimeDelta>,
    points: u32,
    sprint_points: u32,
    mountain_points: u32,
}

impl StageResult {
    /// Build a stage result from the full crossing list.
    ///
    /// `expected_len` is the stage's checkpoint count plus two (start and
    /// finish). Fails with [`RaceError::MalformedTimes`] when the length is
    /// wrong or a crossing is earlier than the one before it.
    pub fn new(
        rider_id: RiderId,
        checkpoint_times: Vec<NaiveTime>,
        expected_len: usize,
    ) -> Result<Self> {
        if checkpoint_times.len() != expected_len {
            return Err(RaceError::malformed(format!(
                "expected {} checkpoint times, got {}",
                expected_len,
                checkpoint_times.len()
            )));
        }
        if checkpoint_times.len() < 2 {
            return Err(RaceError::malformed(
                "a result needs at least a start and a finish time",
            ));
        }
        if let Some(i) = checkpoint_times.windows(2).position(|w| w[1] < w[0]) {
            return Err(RaceError::malformed(format!(
                "time at index {} ({}) is before time at index {} ({})",
                i + 1,
                checkpoint_times[i + 1],
                i,
                checkpoint_times[i]
            )));
        }

        let elapsed_time = time::elapsed(
            checkpoint_times[0],
            checkpoint_times[checkpoint_times.len() - 1],
        );

        Ok(Self {
            rider_id,
            checkpoint_times,
            elapsed_time,
            rank: 0,
            adjusted_elapsed_time: None,
            points: 0,
            sprint_points: 0,
            mountain_points: 0,
        })
    }

    pub fn rider_id(&self) -> RiderId {
        self.rider_id
    }

    /// All crossings: start, intermediates, finish.
    pub fn checkpoint_times(&self) -> &[NaiveTime] {
        &self.checkpoint_times
    }

    /// Crossings at the intermediate checkpoints only.
    pub fn intermediate_times(&self) -> &[NaiveTime] {
        &self.checkpoint_times[1..self.checkpoint_times.len() - 1]
    }

    pub fn time_at(&self, index: usize) -> Option<NaiveTime> {
        self.checkpoint_times.get(index).copied()
    }

    /// Finish minus start.
    pub fn elapsed_time(&self) -> TimeDelta {
        self.elapsed_time
    }

    /// 1-based finishing position, 0 until the stage has been ranked.
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Credited time after bunch neutralization, `None` until ranked.
    pub fn adjusted_elapsed_time(&self) -> Option<TimeDelta> {
        self.adjusted_elapsed_time
    }

    /// Finish-line points.
    pub fn points(&self) -> u32 {
        self.points
    }

    /// Points from intermediate sprints.
    pub fn sprint_points(&self) -> u32 {
        self.sprint_points
    }

    /// Points from categorized climbs.
    pub fn mountain_points(&self) -> u32 {
        self.mountain_points
    }

    /// Finish plus intermediate sprint points (points classification value).
    pub fn total_points(&self) -> u32 {
        self.points + self.sprint_points
    }

    pub(crate) fn set_rank(&mut self, rank: u32) {
        self.rank = rank;
    }

    pub(crate) fn set_adjusted_elapsed_time(&mut self, adjusted: TimeDelta) {
        self.adjusted_elapsed_time = Some(adjusted);
    }

    pub(crate) fn set_points(&mut self, points: u32) {
        self.points = points;
    }

    pub(crate) fn add_sprint_points(&mut self, points: u32) {
        self.sprint_points += points;
    }

    pub(crate) fn add_mountain_points(&mut self, points: u32) {
        self.mountain_points += points;
    }

    pub(crate) fn clear_finish_classification(&mut self) {
        self.rank = 0;
        self.adjusted_elapsed_time = None;
        self.points = 0;
    }

    pub(crate) fn clear_checkpoint_points(&mut self) {
        self.sprint_points = 0;
        self.mountain_points = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_elapsed_time() {
        let result = StageResult::new(1, vec![t(10, 0, 0), t(11, 0, 0), t(13, 15, 30)], 3).unwrap();
        assert_eq!(result.elapsed_time(), TimeDelta::seconds(3 * 3600 + 15 * 60 + 30));
        assert_eq!(result.intermediate_times(), &[t(11, 0, 0)]);
        assert_eq!(result.rank(), 0);
        assert!(result.adjusted_elapsed_time().is_none());
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = StageResult::new(1, vec![t(10, 0, 0), t(12, 0, 0)], 3).unwrap_err();
        assert!(matches!(err, RaceError::MalformedTimes { .. }));
    }

    #[test]
    fn test_non_monotonic_rejected() {
        let err =
            StageResult::new(1, vec![t(10, 0, 0), t(9, 59, 59), t(12, 0, 0)], 3).unwrap_err();
        assert!(matches!(err, RaceError::MalformedTimes { .. }));
    }

    #[test]
    fn test_equal_consecutive_times_accepted() {
        let result = StageResult::new(1, vec![t(10, 0, 0), t(10, 0, 0), t(10, 0, 0)], 3).unwrap();
        assert_eq!(result.elapsed_time(), TimeDelta::zero());
    }

    #[test]
    fn test_derived_fields() {
        let mut result = StageResult::new(4, vec![t(10, 0, 0), t(12, 0, 0)], 2).unwrap();
        result.set_rank(2);
        result.set_points(30);
        result.add_sprint_points(17);
        result.add_sprint_points(3);
        result.add_mountain_points(5);
        assert_eq!(result.total_points(), 50);
        assert_eq!(result.mountain_points(), 5);

        result.clear_checkpoint_points();
        assert_eq!(result.total_points(), 30);
        result.clear_finish_classification();
        assert_eq!(result.rank(), 0);
        assert_eq!(result.points(), 0);
    }
}
