//! End-to-end classification scenarios through the public portal API.
//!
//! Run with: `cargo test --test classification_scenarios`

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use peloton::{ClimbCategory, CyclingPortal, RaceId, RiderId, StageId, StageType};

fn start(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 7, day)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn at(h: u32, m: u32, s: u32, milli: u32) -> NaiveTime {
    NaiveTime::from_hms_milli_opt(h, m, s, milli).unwrap()
}

/// Portal with one race, one team and `riders` riders.
fn setup(riders: usize) -> (CyclingPortal, RaceId, Vec<RiderId>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut portal = CyclingPortal::new();
    let race = portal.create_race("Tour", "Three weeks in July").unwrap();
    let team = portal.create_team("Peloton", "").unwrap();
    let riders = (0..riders)
        .map(|i| portal.create_rider(team, &format!("Rider {}", i), 1990).unwrap())
        .collect();
    (portal, race, riders)
}

fn open_stage(
    portal: &mut CyclingPortal,
    race: RaceId,
    name: &str,
    day: u32,
    stage_type: StageType,
) -> StageId {
    let stage = portal
        .add_stage_to_race(race, name, "", 150.0, start(day), stage_type)
        .unwrap();
    portal.conclude_stage_preparation(stage).unwrap();
    stage
}

// ============================================================================
// Stage Classification
// ============================================================================

#[test]
fn test_flat_stage_bunch_sprint() {
    let (mut portal, race, riders) = setup(3);
    let stage = open_stage(&mut portal, race, "Flat", 1, StageType::Flat);

    portal.register_stage_result(stage, riders[0], &[at(10, 0, 0, 0), at(11, 0, 0, 0)]).unwrap();
    portal.register_stage_result(stage, riders[1], &[at(10, 0, 0, 0), at(11, 0, 0, 500)]).unwrap();
    portal.register_stage_result(stage, riders[2], &[at(10, 0, 0, 0), at(11, 5, 0, 0)]).unwrap();

    assert_eq!(portal.get_stage_ranking(stage).unwrap(), riders);
    assert_eq!(
        portal.get_adjusted_elapsed_times(stage).unwrap(),
        vec![TimeDelta::hours(1), TimeDelta::hours(1), TimeDelta::minutes(65)]
    );
    assert_eq!(portal.get_stage_points(stage).unwrap(), vec![50, 30, 20]);
}

#[test]
fn test_ranks_contiguous_and_points_parallel() {
    let (mut portal, race, riders) = setup(20);
    let stage = open_stage(&mut portal, race, "Hills", 1, StageType::MediumMountain);

    // Register in reverse finishing order
    for (i, &rider) in riders.iter().enumerate().rev() {
        let finish = at(14, i as u32, (i as u32 * 7) % 60, 0);
        portal.register_stage_result(stage, rider, &[at(10, 0, 0, 0), finish]).unwrap();
    }

    let ranking = portal.get_stage_ranking(stage).unwrap();
    let points = portal.get_stage_points(stage).unwrap();
    let mountain = portal.get_stage_mountain_points(stage).unwrap();
    assert_eq!(ranking, riders);
    assert_eq!(points.len(), ranking.len());
    assert_eq!(mountain.len(), ranking.len());
    assert_eq!(&points[..3], &[30, 25, 22]);
    assert!(points[15..].iter().all(|&p| p == 0), "beyond the table scores nothing");

    let json = portal.get_stage_ranking_json(stage).unwrap();
    let rows: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
    let ranks: Vec<u64> = rows.iter().map(|r| r["rank"].as_u64().unwrap()).collect();
    assert_eq!(ranks, (1..=20).collect::<Vec<u64>>());
}

#[test]
fn test_checkpoint_points_follow_crossing_order() {
    let (mut portal, race, riders) = setup(3);
    let stage = portal
        .add_stage_to_race(race, "Queen", "", 180.0, start(2), StageType::HighMountain)
        .unwrap();
    portal.add_intermediate_sprint_to_stage(stage, 60.0).unwrap();
    portal
        .add_categorized_climb_to_stage(stage, 175.0, ClimbCategory::HC, 9.0, 14.0)
        .unwrap();
    portal.conclude_stage_preparation(stage).unwrap();

    // riders[2] wins the sprint, riders[1] crests first, riders[0] wins the stage
    let s = at(10, 0, 0, 0);
    let crossings = [
        [s, at(11, 2, 0, 0), at(14, 1, 0, 0), at(14, 20, 0, 0)],
        [s, at(11, 1, 0, 0), at(14, 0, 0, 0), at(14, 21, 0, 0)],
        [s, at(11, 0, 0, 0), at(14, 2, 0, 0), at(14, 22, 0, 0)],
    ];
    for (&rider, times) in riders.iter().zip(&crossings) {
        portal.register_stage_result(stage, rider, times).unwrap();
    }

    assert_eq!(portal.get_stage_ranking(stage).unwrap(), riders);
    // Finish (20,17,15) plus sprint (15,17,20)
    assert_eq!(portal.get_stage_points(stage).unwrap(), vec![35, 34, 35]);
    assert_eq!(portal.get_stage_sprint_points(stage).unwrap(), vec![15, 17, 20]);
    assert_eq!(portal.get_stage_mountain_points(stage).unwrap(), vec![15, 20, 12]);

    assert_eq!(
        portal.get_mountain_classification(race).unwrap(),
        vec![riders[1], riders[0], riders[2]]
    );
    // 35 / 34 / 35: tie between riders[0] and riders[2] goes to the lower ID
    assert_eq!(
        portal.get_points_classification(race).unwrap(),
        vec![riders[0], riders[2], riders[1]]
    );
}

#[test]
fn test_empty_stage_is_not_an_error() {
    let (mut portal, race, _) = setup(0);
    let stage = open_stage(&mut portal, race, "Quiet", 1, StageType::Flat);
    assert!(portal.get_stage_ranking(stage).unwrap().is_empty());
    assert!(portal.get_stage_points(stage).unwrap().is_empty());
    assert!(portal.get_adjusted_elapsed_times(stage).unwrap().is_empty());
    let (gc, times) = portal.get_general_classification(race).unwrap();
    assert!(gc.is_empty() && times.is_empty());
}

// ============================================================================
// Mutation and Cascades
// ============================================================================

#[test]
fn test_delete_and_reregister_is_idempotent() {
    let (mut portal, race, riders) = setup(4);
    let stage = open_stage(&mut portal, race, "Flat", 1, StageType::Flat);
    let finishes = [at(14, 0, 0, 0), at(14, 0, 0, 400), at(14, 0, 3, 0), at(13, 59, 0, 0)];
    for (&rider, &finish) in riders.iter().zip(&finishes) {
        portal.register_stage_result(stage, rider, &[at(10, 0, 0, 0), finish]).unwrap();
    }
    let ranking = portal.get_stage_ranking(stage).unwrap();
    let adjusted = portal.get_adjusted_elapsed_times(stage).unwrap();
    let points = portal.get_stage_points(stage).unwrap();

    portal.delete_stage_result(stage, riders[3]).unwrap();
    assert_eq!(portal.get_stage_ranking(stage).unwrap().len(), 3);
    portal
        .register_stage_result(stage, riders[3], &[at(10, 0, 0, 0), finishes[3]])
        .unwrap();

    assert_eq!(portal.get_stage_ranking(stage).unwrap(), ranking);
    assert_eq!(portal.get_adjusted_elapsed_times(stage).unwrap(), adjusted);
    assert_eq!(portal.get_stage_points(stage).unwrap(), points);
}

#[test]
fn test_stage_removal_drops_riders_without_other_results() {
    let (mut portal, race, riders) = setup(2);
    let (a, b) = (riders[0], riders[1]);
    let first = open_stage(&mut portal, race, "One", 1, StageType::Flat);
    let second = open_stage(&mut portal, race, "Two", 2, StageType::Flat);

    portal.register_stage_result(first, a, &[at(10, 0, 0, 0), at(14, 0, 0, 0)]).unwrap();
    portal.register_stage_result(first, b, &[at(10, 0, 0, 0), at(14, 5, 0, 0)]).unwrap();
    portal.register_stage_result(second, b, &[at(10, 0, 0, 0), at(13, 0, 0, 0)]).unwrap();

    portal.remove_stage_by_id(first).unwrap();

    let (gc, times) = portal.get_general_classification(race).unwrap();
    assert_eq!(gc, vec![b], "rider without remaining results must leave the race");
    assert_eq!(times, vec![TimeDelta::hours(3)]);
    assert!(portal.get_points_classification(race).unwrap() == vec![b]);
    assert_eq!(portal.get_number_of_stages(race).unwrap(), 1);
}

// ============================================================================
// Race Classification
// ============================================================================

#[test]
fn test_general_classification_sums_adjusted_times() {
    let (mut portal, race, riders) = setup(3);
    let stages: Vec<StageId> = (1..=3)
        .map(|day| open_stage(&mut portal, race, &format!("S{}", day), day, StageType::Flat))
        .collect();

    // Two long days push cumulative time past 24 hours
    let finishes = [
        [at(21, 0, 0, 0), at(21, 0, 0, 600), at(21, 1, 0, 0)],
        [at(22, 30, 0, 0), at(22, 29, 0, 0), at(22, 31, 0, 0)],
        [at(11, 0, 0, 0), at(11, 0, 30, 0), at(10, 59, 59, 500)],
    ];
    for (stage, day) in stages.iter().zip(&finishes) {
        for (&rider, &finish) in riders.iter().zip(day) {
            portal.register_stage_result(*stage, rider, &[at(10, 0, 0, 0), finish]).unwrap();
        }
    }

    let (gc, times) = portal.get_general_classification(race).unwrap();
    assert_eq!(gc.len(), 3);
    for (rider, total) in gc.iter().zip(&times) {
        let expected: TimeDelta = stages
            .iter()
            .map(|&stage| {
                portal
                    .get_rider_adjusted_elapsed_time_in_stage(stage, *rider)
                    .unwrap()
                    .unwrap()
            })
            .fold(TimeDelta::zero(), |acc, d| acc + d);
        assert_eq!(*total, expected);
        assert!(*total > TimeDelta::hours(24));
    }
    assert!(times.windows(2).all(|w| w[0] <= w[1]));

    // Day one: riders[1] is bunched with riders[0]
    assert_eq!(
        portal.get_rider_adjusted_elapsed_time_in_stage(stages[0], riders[1]).unwrap(),
        Some(TimeDelta::hours(11))
    );

    let points = portal.get_riders_points_in_race(race).unwrap();
    assert_eq!(points.len(), gc.len());
    let mountain = portal.get_riders_mountain_points_in_race(race).unwrap();
    assert!(mountain.iter().all(|&m| m == 0));
}

#[test]
fn test_results_rejected_after_race_removed() {
    let (mut portal, race, riders) = setup(1);
    let stage = open_stage(&mut portal, race, "Solo", 1, StageType::TimeTrial);
    portal.remove_race_by_id(race).unwrap();
    assert!(portal
        .register_stage_result(stage, riders[0], &[at(10, 0, 0, 0), at(10, 30, 0, 0)])
        .unwrap_err()
        .is_not_found());
}
