//! # Peloton
//!
//! Results and classification engine for multi-stage cycling races.
//!
//! This library provides:
//! - Stage rankings with bunch-sprint time neutralization
//! - Finish, intermediate sprint and mountain points per stage
//! - Race-wide general, points and mountain classifications
//!
//! ## Features
//!
//! - **`persistence`** (default) - Save and load the whole portal to SQLite
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{NaiveDate, NaiveTime};
//! use peloton::{CyclingPortal, StageType};
//!
//! let mut portal = CyclingPortal::new();
//! let race = portal.create_race("Tour", "Three week race").unwrap();
//! let start = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
//! let stage = portal
//!     .add_stage_to_race(race, "Opener", "Flat run in", 180.0, start, StageType::Flat)
//!     .unwrap();
//! portal.conclude_stage_preparation(stage).unwrap();
//!
//! let team = portal.create_team("Blue", "").unwrap();
//! let rider = portal.create_rider(team, "Ana", 1998).unwrap();
//! let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
//! portal.register_stage_result(stage, rider, &[t(12, 0), t(16, 30)]).unwrap();
//!
//! assert_eq!(portal.get_stage_ranking(stage).unwrap(), vec![rider]);
//! assert_eq!(portal.get_stage_points(stage).unwrap(), vec![50]);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, RaceError, Result};

// Elapsed/cumulative time arithmetic
pub mod time;

// One rider's raw checkpoint crossings for one stage
pub mod stage_result;
pub use stage_result::StageResult;

// Stage ranking, time neutralization and points tables
pub mod classification;

// Stage entity with lazily recomputed classification caches
pub mod stage;
pub use stage::Stage;

// Race-wide per-rider aggregate
pub mod result;
pub use result::{RiderResult, RiderTotals};

// Race entity and race-wide classifications
pub mod race;
pub use race::{Race, RaceClassification};

// Top-level registry (singleton with all portal state)
pub mod portal;
pub use portal::{with_portal, CyclingPortal, Rider, RiderStageTimes, Team, PORTAL};

// SQLite persistence for the whole portal
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::{load_portal, save_portal};

// ============================================================================
// Identifiers
// ============================================================================

pub type RaceId = u32;
pub type StageId = u32;
pub type CheckpointId = u32;
pub type TeamId = u32;
pub type RiderId = u32;

// ============================================================================
// Core Types
// ============================================================================

/// Stage profile. Selects the finish-line points table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageType {
    Flat,
    MediumMountain,
    HighMountain,
    TimeTrial,
}

impl StageType {
    /// Time trials carry no intermediate sprints or climbs.
    pub fn allows_checkpoints(&self) -> bool {
        !matches!(self, StageType::TimeTrial)
    }
}

/// Stage lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageState {
    /// Checkpoints can still be added or removed
    UnderConstruction,
    /// Course is frozen and results can be registered
    WaitingForResults,
}

/// Climb category, from easiest (C4) to hors catégorie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClimbCategory {
    C4,
    C3,
    C2,
    C1,
    HC,
}

/// What a checkpoint awards points for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CheckpointKind {
    /// Intermediate sprint (sprint points)
    Sprint,
    /// Categorized climb (mountain points)
    Climb {
        category: ClimbCategory,
        /// Average gradient in percent
        average_gradient: f64,
        /// Climb length in kilometers
        length: f64,
    },
}

impl CheckpointKind {
    pub fn is_climb(&self) -> bool {
        matches!(self, CheckpointKind::Climb { .. })
    }
}

/// An intermediate point on a stage course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub stage_id: StageId,
    /// Distance from the stage start in kilometers, `0 < location <= length`
    pub location: f64,
    pub kind: CheckpointKind,
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the portal and its classification rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Whole-second gap to the rider ahead that starts a new finishing group.
    /// Riders closer than this inherit the adjusted time of the rider ahead.
    /// Default: 1
    pub bunch_gap_seconds: i64,

    /// Maximum team name length in characters.
    /// Default: 30
    pub max_team_name_length: usize,

    /// Earliest accepted rider year of birth.
    /// Default: 1900
    pub min_year_of_birth: i32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            bunch_gap_seconds: 1,
            max_team_name_length: 30,
            min_year_of_birth: 1900,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
