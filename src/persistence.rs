//! # Portal Persistence
//!
//! Saves and loads the complete portal state to a SQLite file.
//!
//! Only raw data is stored: entities, checkpoints and each rider's checkpoint
//! crossing times. Rankings, adjusted times and points are derived and are
//! recomputed on the first read after loading. Race-wide rider results are
//! rebuilt from the stage results.
//!
//! Checkpoint lists and crossing-time arrays are stored as MessagePack blobs.

use std::path::Path;

use chrono::{NaiveDateTime, NaiveTime};
use log::{debug, info};
use rusqlite::{params, Connection};

use crate::error::{RaceError, Result};
use crate::portal::{Rider, Team};
use crate::{Checkpoint, CyclingPortal, PortalConfig, Race, Stage, StageState, StageType};

const START_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// ============================================================================
// Schema
// ============================================================================

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- ID counters and configuration (key/value)
        CREATE TABLE IF NOT EXISTS counters (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS config (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            data BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS races (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL
        );

        -- Position keeps the race's stage creation order
        CREATE TABLE IF NOT EXISTS stages (
            id INTEGER PRIMARY KEY,
            race_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            length REAL NOT NULL,
            start_time TEXT NOT NULL,
            stage_type TEXT NOT NULL,
            state TEXT NOT NULL,
            checkpoints BLOB NOT NULL,
            FOREIGN KEY (race_id) REFERENCES races(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS riders (
            id INTEGER PRIMARY KEY,
            team_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            year_of_birth INTEGER NOT NULL,
            FOREIGN KEY (team_id) REFERENCES teams(id) ON DELETE CASCADE
        );

        -- Seq keeps registration order within a stage
        CREATE TABLE IF NOT EXISTS stage_results (
            stage_id INTEGER NOT NULL,
            rider_id INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            checkpoint_times BLOB NOT NULL,
            PRIMARY KEY (stage_id, rider_id),
            FOREIGN KEY (stage_id) REFERENCES stages(id) ON DELETE CASCADE,
            FOREIGN KEY (rider_id) REFERENCES riders(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_stages_race ON stages(race_id);
        CREATE INDEX IF NOT EXISTS idx_riders_team ON riders(team_id);
        "#,
    )?;
    Ok(())
}

fn stage_type_name(stage_type: StageType) -> &'static str {
    match stage_type {
        StageType::Flat => "flat",
        StageType::MediumMountain => "medium_mountain",
        StageType::HighMountain => "high_mountain",
        StageType::TimeTrial => "time_trial",
    }
}

fn parse_stage_type(name: &str) -> Result<StageType> {
    match name {
        "flat" => Ok(StageType::Flat),
        "medium_mountain" => Ok(StageType::MediumMountain),
        "high_mountain" => Ok(StageType::HighMountain),
        "time_trial" => Ok(StageType::TimeTrial),
        other => Err(RaceError::Persistence {
            message: format!("unknown stage type '{}'", other),
        }),
    }
}

fn stage_state_name(state: StageState) -> &'static str {
    match state {
        StageState::UnderConstruction => "under_construction",
        StageState::WaitingForResults => "waiting_for_results",
    }
}

fn parse_stage_state(name: &str) -> Result<StageState> {
    match name {
        "under_construction" => Ok(StageState::UnderConstruction),
        "waiting_for_results" => Ok(StageState::WaitingForResults),
        other => Err(RaceError::Persistence {
            message: format!("unknown stage state '{}'", other),
        }),
    }
}

/// Narrow a stored integer back to an ID, rejecting out-of-range values.
fn stored_id(value: i64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| RaceError::Persistence {
        message: format!("{} out of range: {}", what, value),
    })
}

// ============================================================================
// Save
// ============================================================================

/// Write the full portal to `path`, replacing anything stored there before.
pub fn save_portal<P: AsRef<Path>>(portal: &CyclingPortal, path: P) -> Result<()> {
    let mut conn = Connection::open(path.as_ref())?;
    init_schema(&conn)?;

    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
        DELETE FROM stage_results;
        DELETE FROM riders;
        DELETE FROM teams;
        DELETE FROM stages;
        DELETE FROM races;
        DELETE FROM config;
        DELETE FROM counters;
        "#,
    )?;

    {
        let mut stmt = tx.prepare("INSERT INTO counters (name, value) VALUES (?, ?)")?;
        for (name, value) in [
            ("next_race_id", portal.next_race_id),
            ("next_stage_id", portal.next_stage_id),
            ("next_checkpoint_id", portal.next_checkpoint_id),
            ("next_team_id", portal.next_team_id),
            ("next_rider_id", portal.next_rider_id),
        ] {
            stmt.execute(params![name, value as i64])?;
        }

        let config_blob = rmp_serde::to_vec(&portal.config)?;
        tx.execute(
            "INSERT INTO config (id, data) VALUES (1, ?)",
            params![config_blob],
        )?;

        let mut team_stmt =
            tx.prepare("INSERT INTO teams (id, name, description) VALUES (?, ?, ?)")?;
        for team in portal.teams.values() {
            team_stmt.execute(params![team.id as i64, team.name, team.description])?;
        }

        let mut rider_stmt = tx.prepare(
            "INSERT INTO riders (id, team_id, name, year_of_birth) VALUES (?, ?, ?, ?)",
        )?;
        for rider in portal.riders.values() {
            rider_stmt.execute(params![
                rider.id as i64,
                rider.team_id as i64,
                rider.name,
                rider.year_of_birth,
            ])?;
        }

        let mut race_stmt =
            tx.prepare("INSERT INTO races (id, name, description) VALUES (?, ?, ?)")?;
        for race in portal.races.values() {
            race_stmt.execute(params![race.id() as i64, race.name(), race.description()])?;
        }

        let mut stage_stmt = tx.prepare(
            "INSERT INTO stages (id, race_id, position, name, description, length, start_time, stage_type, state, checkpoints)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        let mut result_stmt = tx.prepare(
            "INSERT INTO stage_results (stage_id, rider_id, seq, checkpoint_times) VALUES (?, ?, ?, ?)",
        )?;
        for race in portal.races.values() {
            for (position, stage_id) in race.stage_ids().iter().enumerate() {
                let Some(stage) = portal.stages.get(stage_id) else {
                    continue;
                };
                let checkpoints_blob = rmp_serde::to_vec(stage.checkpoints())?;
                stage_stmt.execute(params![
                    stage.id() as i64,
                    race.id() as i64,
                    position as i64,
                    stage.name(),
                    stage.description(),
                    stage.length(),
                    stage.start_time().format(START_TIME_FORMAT).to_string(),
                    stage_type_name(stage.stage_type()),
                    stage_state_name(stage.state()),
                    checkpoints_blob,
                ])?;

                for (seq, result) in stage.results().iter().enumerate() {
                    let times_blob = rmp_serde::to_vec(result.checkpoint_times())?;
                    result_stmt.execute(params![
                        stage.id() as i64,
                        result.rider_id() as i64,
                        seq as i64,
                        times_blob,
                    ])?;
                }
            }
        }
    }

    tx.commit()?;
    info!(
        "[Persistence] Saved {} races, {} stages, {} teams, {} riders",
        portal.races.len(),
        portal.stages.len(),
        portal.teams.len(),
        portal.riders.len()
    );
    Ok(())
}

// ============================================================================
// Load
// ============================================================================

/// Read a portal previously written by [`save_portal`].
pub fn load_portal<P: AsRef<Path>>(path: P) -> Result<CyclingPortal> {
    let conn = Connection::open(path.as_ref())?;
    init_schema(&conn)?;

    let config = {
        let mut stmt = conn.prepare("SELECT data FROM config WHERE id = 1")?;
        let blobs: Vec<Vec<u8>> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        match blobs.first() {
            Some(blob) => rmp_serde::from_slice::<PortalConfig>(blob)?,
            None => PortalConfig::default(),
        }
    };
    let mut portal = CyclingPortal::with_config(config);

    load_counters(&conn, &mut portal)?;
    load_races(&conn, &mut portal)?;
    load_stages(&conn, &mut portal)?;
    load_teams_and_riders(&conn, &mut portal)?;
    load_stage_results(&conn, &mut portal)?;

    info!(
        "[Persistence] Loaded {} races, {} stages, {} teams, {} riders",
        portal.races.len(),
        portal.stages.len(),
        portal.teams.len(),
        portal.riders.len()
    );
    Ok(portal)
}

fn load_counters(conn: &Connection, portal: &mut CyclingPortal) -> Result<()> {
    let mut stmt = conn.prepare("SELECT name, value FROM counters")?;
    let rows: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;

    for (name, value) in rows {
        let value = stored_id(value, &name)?;
        match name.as_str() {
            "next_race_id" => portal.next_race_id = value,
            "next_stage_id" => portal.next_stage_id = value,
            "next_checkpoint_id" => portal.next_checkpoint_id = value,
            "next_team_id" => portal.next_team_id = value,
            "next_rider_id" => portal.next_rider_id = value,
            other => debug!("[Persistence] Ignoring unknown counter '{}'", other),
        }
    }
    Ok(())
}

fn load_races(conn: &Connection, portal: &mut CyclingPortal) -> Result<()> {
    let mut stmt = conn.prepare("SELECT id, name, description FROM races ORDER BY id")?;
    let rows: Vec<(i64, String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<rusqlite::Result<_>>()?;

    for (id, name, description) in rows {
        let id = stored_id(id, "race id")?;
        portal.races.insert(id, Race::new(id, name, description));
    }
    Ok(())
}

struct StageRow {
    id: i64,
    race_id: i64,
    name: String,
    description: String,
    length: f64,
    start_time: String,
    stage_type: String,
    state: String,
    checkpoints: Vec<u8>,
}

fn load_stages(conn: &Connection, portal: &mut CyclingPortal) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, race_id, name, description, length, start_time, stage_type, state, checkpoints
         FROM stages ORDER BY race_id, position",
    )?;
    let rows: Vec<StageRow> = stmt
        .query_map([], |row| {
            Ok(StageRow {
                id: row.get(0)?,
                race_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
                length: row.get(4)?,
                start_time: row.get(5)?,
                stage_type: row.get(6)?,
                state: row.get(7)?,
                checkpoints: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    for row in rows {
        let start_time = NaiveDateTime::parse_from_str(&row.start_time, START_TIME_FORMAT)
            .map_err(|e| RaceError::Persistence {
                message: format!("bad start time '{}': {}", row.start_time, e),
            })?;
        let checkpoints: Vec<Checkpoint> = rmp_serde::from_slice(&row.checkpoints)?;

        let mut stage = Stage::new(
            stored_id(row.id, "stage id")?,
            stored_id(row.race_id, "race id")?,
            row.name,
            row.description,
            row.length,
            start_time,
            parse_stage_type(&row.stage_type)?,
            portal.config.bunch_gap_seconds,
        )?;
        stage.restore_state(parse_stage_state(&row.state)?, checkpoints);

        if let Some(race) = portal.races.get_mut(&stage.race_id()) {
            race.add_stage(stage.id());
        }
        portal.stages.insert(stage.id(), stage);
    }
    Ok(())
}

fn load_teams_and_riders(conn: &Connection, portal: &mut CyclingPortal) -> Result<()> {
    let mut stmt = conn.prepare("SELECT id, name, description FROM teams ORDER BY id")?;
    let teams: Vec<(i64, String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<rusqlite::Result<_>>()?;
    for (id, name, description) in teams {
        let id = stored_id(id, "team id")?;
        portal.teams.insert(
            id,
            Team {
                id,
                name,
                description,
                rider_ids: Vec::new(),
            },
        );
    }

    let mut stmt =
        conn.prepare("SELECT id, team_id, name, year_of_birth FROM riders ORDER BY id")?;
    let riders: Vec<(i64, i64, String, i32)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
        .collect::<rusqlite::Result<_>>()?;
    for (id, team_id, name, year_of_birth) in riders {
        let id = stored_id(id, "rider id")?;
        let team_id = stored_id(team_id, "team id")?;
        if let Some(team) = portal.teams.get_mut(&team_id) {
            team.rider_ids.push(id);
        }
        portal.riders.insert(
            id,
            Rider {
                id,
                team_id,
                name,
                year_of_birth,
            },
        );
    }
    Ok(())
}

fn load_stage_results(conn: &Connection, portal: &mut CyclingPortal) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT stage_id, rider_id, checkpoint_times FROM stage_results ORDER BY stage_id, seq",
    )?;
    let rows: Vec<(i64, i64, Vec<u8>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<rusqlite::Result<_>>()?;

    let mut restored = 0;
    for (stage_id, rider_id, blob) in rows {
        let stage_id = stored_id(stage_id, "stage id")?;
        let rider_id = stored_id(rider_id, "rider id")?;
        let times: Vec<NaiveTime> = rmp_serde::from_slice(&blob)?;
        let Some(stage) = portal.stages.get_mut(&stage_id) else {
            continue;
        };
        stage.restore_result(rider_id, times)?;
        if let Some(race) = portal.races.get_mut(&stage.race_id()) {
            race.add_stage_result(rider_id, stage_id);
        }
        restored += 1;
    }
    debug!("[Persistence] Restored {} stage results", restored);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
