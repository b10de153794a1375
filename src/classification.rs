//! # Stage Classification
//!
//! Turns the raw crossings of every rider in a stage into:
//! - a finishing order (stable on registration order for equal times)
//! - neutralized ("adjusted") elapsed times for finishing groups
//! - finish-line points by rank
//! - sprint and mountain points at each intermediate checkpoint
//!
//! All functions here are pure over a slice of [`StageResult`]s; the owning
//! [`Stage`](crate::Stage) decides when they run.

use chrono::TimeDelta;

use crate::{time, Checkpoint, CheckpointKind, ClimbCategory, StageResult, StageType};

// ============================================================================
// Points Tables
// ============================================================================

pub const FLAT_POINTS: [u32; 15] = [50, 30, 20, 18, 16, 14, 12, 10, 8, 7, 6, 5, 4, 3, 2];
pub const MEDIUM_MOUNTAIN_POINTS: [u32; 15] = [30, 25, 22, 19, 17, 15, 13, 11, 9, 7, 6, 5, 4, 3, 2];
/// High mountain and time trial finishes.
pub const HIGH_MOUNTAIN_POINTS: [u32; 15] = [20, 17, 15, 13, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1];
pub const INTERMEDIATE_SPRINT_POINTS: [u32; 15] =
    [20, 17, 15, 13, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1];
pub const HC_CLIMB_POINTS: [u32; 8] = [20, 15, 12, 10, 8, 6, 4, 2];
pub const C1_CLIMB_POINTS: [u32; 4] = [5, 3, 2, 1];
pub const C2_CLIMB_POINTS: [u32; 2] = [2, 1];
pub const C3_CLIMB_POINTS: [u32; 2] = [1, 1];
pub const C4_CLIMB_POINTS: [u32; 1] = [1];

/// Finish-line points table for a stage type.
pub fn finish_points_table(stage_type: StageType) -> &'static [u32] {
    match stage_type {
        StageType::Flat => &FLAT_POINTS,
        StageType::MediumMountain => &MEDIUM_MOUNTAIN_POINTS,
        StageType::HighMountain | StageType::TimeTrial => &HIGH_MOUNTAIN_POINTS,
    }
}

/// Points table for an intermediate checkpoint.
pub fn checkpoint_points_table(kind: &CheckpointKind) -> &'static [u32] {
    match kind {
        CheckpointKind::Sprint => &INTERMEDIATE_SPRINT_POINTS,
        CheckpointKind::Climb { category, .. } => match category {
            ClimbCategory::HC => &HC_CLIMB_POINTS,
            ClimbCategory::C1 => &C1_CLIMB_POINTS,
            ClimbCategory::C2 => &C2_CLIMB_POINTS,
            ClimbCategory::C3 => &C3_CLIMB_POINTS,
            ClimbCategory::C4 => &C4_CLIMB_POINTS,
        },
    }
}

/// Points for a 0-based position; 0 beyond the end of the table.
pub fn points_for_position(table: &[u32], position: usize) -> u32 {
    table.get(position).copied().unwrap_or(0)
}

// ============================================================================
// Finish Line
// ============================================================================

/// Indices into `results` ordered by raw elapsed time.
///
/// The sort is stable, so equal times keep registration order.
pub fn finishing_order(results: &[StageResult]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..results.len()).collect();
    order.sort_by_key(|&i| results[i].elapsed_time());
    order
}

/// Adjusted times for elapsed times already sorted ascending.
///
/// Each rider is compared with the rider directly ahead only. A whole-second
/// gap below `bunch_gap_seconds` means the rider inherits the adjusted time of
/// the rider ahead, so a chain of close finishers all share the time of the
/// first rider in the chain.
pub fn neutralize(sorted_elapsed: &[TimeDelta], bunch_gap_seconds: i64) -> Vec<TimeDelta> {
    let mut adjusted: Vec<TimeDelta> = Vec::with_capacity(sorted_elapsed.len());
    for (i, &elapsed) in sorted_elapsed.iter().enumerate() {
        let credited = match i {
            0 => elapsed,
            _ => {
                let gap = time::whole_seconds_between(sorted_elapsed[i - 1], elapsed);
                if gap < bunch_gap_seconds {
                    adjusted[i - 1]
                } else {
                    elapsed
                }
            }
        };
        adjusted.push(credited);
    }
    adjusted
}

/// Rank, neutralize and award finish points in place.
///
/// Returns the finishing order as indices into `results`.
pub fn apply_finish_classification(
    results: &mut [StageResult],
    stage_type: StageType,
    bunch_gap_seconds: i64,
) -> Vec<usize> {
    let order = finishing_order(results);
    let sorted_elapsed: Vec<TimeDelta> = order.iter().map(|&i| results[i].elapsed_time()).collect();
    let adjusted = neutralize(&sorted_elapsed, bunch_gap_seconds);
    let table = finish_points_table(stage_type);

    for (position, &i) in order.iter().enumerate() {
        let result = &mut results[i];
        result.clear_finish_classification();
        result.set_rank(position as u32 + 1);
        result.set_adjusted_elapsed_time(adjusted[position]);
        result.set_points(points_for_position(table, position));
    }

    order
}

// ============================================================================
// Intermediate Checkpoints
// ============================================================================

/// Indices into `results` ordered by crossing time at `time_index`
/// (1 = first intermediate checkpoint). Stable on registration order.
pub fn crossing_order(results: &[StageResult], time_index: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..results.len()).collect();
    order.sort_by_key(|&i| results[i].time_at(time_index));
    order
}

/// Award sprint and mountain points for every checkpoint in place.
///
/// `checkpoints` must be in course order so that checkpoint `n` lines up with
/// crossing time `n + 1`. Points from several checkpoints add up.
pub fn apply_checkpoint_points(results: &mut [StageResult], checkpoints: &[Checkpoint]) {
    for result in results.iter_mut() {
        result.clear_checkpoint_points();
    }

    for (n, checkpoint) in checkpoints.iter().enumerate() {
        let table = checkpoint_points_table(&checkpoint.kind);
        let order = crossing_order(results, n + 1);

        for (position, &i) in order.iter().take(table.len()).enumerate() {
            let points = table[position];
            match checkpoint.kind {
                CheckpointKind::Sprint => results[i].add_sprint_points(points),
                CheckpointKind::Climb { .. } => results[i].add_mountain_points(points),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn at(h: u32, m: u32, s: u32, milli: u32) -> NaiveTime {
        NaiveTime::from_hms_milli_opt(h, m, s, milli).unwrap()
    }

    fn finish_only(rider_id: u32, finish: NaiveTime) -> StageResult {
        StageResult::new(rider_id, vec![at(10, 0, 0, 0), finish], 2).unwrap()
    }

    fn climb(id: u32, category: ClimbCategory, location: f64) -> Checkpoint {
        Checkpoint {
            id,
            stage_id: 1,
            location,
            kind: CheckpointKind::Climb {
                category,
                average_gradient: 6.0,
                length: 5.0,
            },
        }
    }

    fn sprint(id: u32, location: f64) -> Checkpoint {
        Checkpoint {
            id,
            stage_id: 1,
            location,
            kind: CheckpointKind::Sprint,
        }
    }

    #[test]
    fn test_flat_bunch_example() {
        let mut results = vec![
            finish_only(3, at(11, 5, 0, 0)),
            finish_only(1, at(11, 0, 0, 0)),
            finish_only(2, at(11, 0, 0, 500)),
        ];

        let order = apply_finish_classification(&mut results, StageType::Flat, 1);
        let riders: Vec<u32> = order.iter().map(|&i| results[i].rider_id()).collect();
        assert_eq!(riders, vec![1, 2, 3]);

        let ranks: Vec<u32> = order.iter().map(|&i| results[i].rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);

        let adjusted: Vec<TimeDelta> = order
            .iter()
            .map(|&i| results[i].adjusted_elapsed_time().unwrap())
            .collect();
        assert_eq!(
            adjusted,
            vec![TimeDelta::hours(1), TimeDelta::hours(1), TimeDelta::minutes(65)]
        );

        let points: Vec<u32> = order.iter().map(|&i| results[i].points()).collect();
        assert_eq!(points, vec![50, 30, 20]);
    }

    #[test]
    fn test_neutralize_chain() {
        // Each rider within a second of the one ahead, 2.1s spread overall
        let elapsed = vec![
            TimeDelta::milliseconds(3_600_000),
            TimeDelta::milliseconds(3_600_800),
            TimeDelta::milliseconds(3_601_500),
            TimeDelta::milliseconds(3_602_100),
        ];
        let adjusted = neutralize(&elapsed, 1);
        assert!(adjusted.iter().all(|&a| a == elapsed[0]));
    }

    #[test]
    fn test_neutralize_gap_breaks_group() {
        let elapsed = vec![
            TimeDelta::seconds(100),
            TimeDelta::seconds(101),
            TimeDelta::milliseconds(101_400),
        ];
        let adjusted = neutralize(&elapsed, 1);
        assert_eq!(
            adjusted,
            vec![TimeDelta::seconds(100), TimeDelta::seconds(101), TimeDelta::seconds(101)]
        );
    }

    #[test]
    fn test_equal_times_keep_registration_order() {
        let mut results = vec![
            finish_only(9, at(12, 0, 0, 0)),
            finish_only(4, at(12, 0, 0, 0)),
        ];
        let order = apply_finish_classification(&mut results, StageType::HighMountain, 1);
        assert_eq!(order, vec![0, 1]);
        assert_eq!(results[0].rank(), 1);
        assert_eq!(results[1].rank(), 2);
        // Shared time, distinct points
        assert_eq!(results[0].adjusted_elapsed_time(), results[1].adjusted_elapsed_time());
        assert_eq!(results[0].points(), 20);
        assert_eq!(results[1].points(), 17);
    }

    #[test]
    fn test_points_beyond_table_are_zero() {
        let mut results: Vec<StageResult> = (0..20)
            .map(|i| finish_only(i + 1, at(12, i, 0, 0)))
            .collect();
        let order = apply_finish_classification(&mut results, StageType::MediumMountain, 1);
        let points: Vec<u32> = order.iter().map(|&i| results[i].points()).collect();
        assert_eq!(&points[..15], &MEDIUM_MOUNTAIN_POINTS);
        assert!(points[15..].iter().all(|&p| p == 0));
    }

    #[test]
    fn test_time_trial_uses_high_mountain_table() {
        assert_eq!(finish_points_table(StageType::TimeTrial), &HIGH_MOUNTAIN_POINTS);
    }

    #[test]
    fn test_checkpoint_points_by_crossing_order() {
        // Rider 2 leads over the climb, rider 1 wins the sprint and the stage
        let mut results = vec![
            StageResult::new(
                1,
                vec![at(10, 0, 0, 0), at(10, 40, 0, 0), at(11, 0, 0, 0), at(12, 0, 0, 0)],
                4,
            )
            .unwrap(),
            StageResult::new(
                2,
                vec![at(10, 0, 0, 0), at(10, 35, 0, 0), at(11, 2, 0, 0), at(12, 3, 0, 0)],
                4,
            )
            .unwrap(),
            StageResult::new(
                3,
                vec![at(10, 0, 0, 0), at(10, 45, 0, 0), at(11, 1, 0, 0), at(12, 9, 0, 0)],
                4,
            )
            .unwrap(),
        ];
        let checkpoints = vec![climb(1, ClimbCategory::C2, 20.0), sprint(2, 40.0)];

        apply_checkpoint_points(&mut results, &checkpoints);

        assert_eq!(results[0].mountain_points(), 1);
        assert_eq!(results[1].mountain_points(), 2);
        assert_eq!(results[2].mountain_points(), 0);

        assert_eq!(results[0].sprint_points(), 20);
        assert_eq!(results[2].sprint_points(), 17);
        assert_eq!(results[1].sprint_points(), 15);
    }

    #[test]
    fn test_checkpoint_points_accumulate() {
        let mut results = vec![StageResult::new(
            1,
            vec![at(10, 0, 0, 0), at(10, 30, 0, 0), at(11, 0, 0, 0), at(12, 0, 0, 0)],
            4,
        )
        .unwrap()];
        let checkpoints = vec![
            climb(1, ClimbCategory::HC, 10.0),
            climb(2, ClimbCategory::C4, 30.0),
        ];

        apply_checkpoint_points(&mut results, &checkpoints);
        assert_eq!(results[0].mountain_points(), 21);

        // Recomputing does not double count
        apply_checkpoint_points(&mut results, &checkpoints);
        assert_eq!(results[0].mountain_points(), 21);
    }

    #[test]
    fn test_empty_stage() {
        let mut results: Vec<StageResult> = Vec::new();
        let order = apply_finish_classification(&mut results, StageType::Flat, 1);
        assert!(order.is_empty());
        apply_checkpoint_points(&mut results, &[sprint(1, 10.0)]);
    }
}
