//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api::{self, CreateRollRequest, CreateStudentRequest};
use crate::config::Config;
use chrono::{DateTime, Datelike, TimeDelta, Utc, Weekday};
use rollcall_core::{
    Comparison, NewGroup, NewRoll, NewStudent, RollMark, RollState, RollcallError, Store, StudentId,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for import (10 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), RollcallError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| RollcallError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(RollcallError::Validation(vec![format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )]));
    }
    Ok(())
}

/// Resolve an input path and make sure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, RollcallError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| RollcallError::Io(format!("Invalid file path '{}': {}", path.display(), e)))?;

    if !canonical.is_file() {
        return Err(RollcallError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &Config) -> Result<(), RollcallError> {
    let store = Store::open(&config.database)?;

    println!("Rollcall Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:       {}", config.server.host);
    println!("  Port:       {}", config.server.port);
    println!("  Database:   {:?}", config.database);
    println!("  Rate limit: {} req/s", config.server.rate_limit);
    println!();
    println!("Endpoints:");
    println!("  GET    /groups              - List groups");
    println!("  POST   /groups              - Create a group");
    println!("  PUT    /groups/{{id}}         - Update a group");
    println!("  DELETE /groups/{{id}}         - Delete a group");
    println!("  GET    /groups/{{id}}/students - Group members");
    println!("  POST   /groups/run-filters  - Recompute memberships");
    println!("  GET    /students/{{id}}       - One student");
    println!("  GET    /health              - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&config.server, store).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show record counts.
pub fn cmd_status(db_path: &Path, json_mode: bool) -> Result<(), RollcallError> {
    let store = Store::open(db_path)?;
    let stats = store.stats()?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": db_path.to_string_lossy(),
            "groups": stats.groups,
            "students": stats.students,
            "rolls": stats.rolls,
            "roll_states": stats.roll_states,
            "group_students": stats.group_students,
        }));
        return Ok(());
    }

    println!("Rollcall Status");
    println!("===============");
    println!("Database: {:?}", db_path);
    println!();
    println!("Groups:          {}", stats.groups);
    println!("Students:        {}", stats.students);
    println!("Rolls:           {}", stats.rolls);
    println!("Roll states:     {}", stats.roll_states);
    println!("Group members:   {}", stats.group_students);

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new empty database.
pub fn cmd_init(db_path: &Path, force: bool) -> Result<(), RollcallError> {
    if db_path.exists() {
        if !force {
            return Err(RollcallError::Validation(vec![
                "Database already exists. Use --force to overwrite.".to_string(),
            ]));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| RollcallError::Io(format!("Cannot remove old database: {}", e)))?;
        tracing::warn!(path = %db_path.display(), "existing database removed");
    }

    let _store = Store::open(db_path)?;
    println!("Initialized new redb database at {:?}", db_path);
    Ok(())
}

// =============================================================================
// SEED COMMAND
// =============================================================================

const SEED_STUDENTS: [(&str, &str); 8] = [
    ("Amara", "Okafor"),
    ("Ben", "Hughes"),
    ("Chloe", "Nguyen"),
    ("Dev", "Patel"),
    ("Elena", "Rossi"),
    ("Finn", "O'Brien"),
    ("Grace", "Kim"),
    ("Hugo", "Silva"),
];

/// Demo students plus one roll per weekday over the last three weeks.
///
/// States are a fixed pattern so repeated seeds look alike: the third student
/// is often absent and the fifth often late.
fn seed_data(now: DateTime<Utc>) -> (Vec<NewStudent>, Vec<NewRoll>) {
    let students = SEED_STUDENTS
        .iter()
        .map(|(first, last)| NewStudent {
            first_name: (*first).to_string(),
            last_name: (*last).to_string(),
        })
        .collect();

    let mut rolls = Vec::new();
    for days_ago in (1..=21i64).rev() {
        let completed_at = now - TimeDelta::days(days_ago);
        if matches!(completed_at.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        let states = (1..=SEED_STUDENTS.len() as u64)
            .map(|student| RollMark {
                student_id: StudentId(student),
                state: seed_state(days_ago, student),
            })
            .collect();
        rolls.push(NewRoll {
            completed_at,
            states,
        });
    }
    (students, rolls)
}

fn seed_state(days_ago: i64, student: u64) -> RollState {
    match (student, days_ago % 3, days_ago % 4) {
        (3, 0, _) | (3, _, 1) => RollState::Absent,
        (5, _, 0) | (5, 1, _) => RollState::Late,
        (_, _, _) if (days_ago + student as i64) % 11 == 0 => RollState::Absent,
        (_, _, _) if (days_ago + student as i64) % 13 == 0 => RollState::Late,
        _ => RollState::Present,
    }
}

fn seed_groups() -> [NewGroup; 2] {
    [
        NewGroup {
            name: "Absent more than twice in two weeks".to_string(),
            number_of_weeks: 2,
            roll_states: RollState::Absent,
            incidents: 2,
            ltmt: Comparison::MoreThan,
        },
        NewGroup {
            name: "Late more than three times in three weeks".to_string(),
            number_of_weeks: 3,
            roll_states: RollState::Late,
            incidents: 3,
            ltmt: Comparison::MoreThan,
        },
    ]
}

/// Load the demo data set into a fresh database.
pub fn cmd_seed(db_path: &Path, json_mode: bool) -> Result<(), RollcallError> {
    let store = Store::open(db_path)?;
    let (students, rolls) = seed_data(Utc::now());
    let (summary, groups) = store.seed(students, rolls, seed_groups().into())?;

    if json_mode {
        print_json(&serde_json::json!({
            "students": summary.students,
            "rolls": summary.rolls,
            "roll_states": summary.roll_states,
            "groups": groups.iter().map(|g| g.id.0).collect::<Vec<_>>(),
        }));
        return Ok(());
    }

    println!("Seeded {:?}", db_path);
    println!("  Students:    {}", summary.students);
    println!("  Rolls:       {}", summary.rolls);
    println!("  Roll states: {}", summary.roll_states);
    for group in &groups {
        println!("  Group {}: {}", group.id, group.name);
    }
    println!();
    println!("Run `rollcall run-filters` to compute group members.");
    Ok(())
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// Shape of an import file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportDocument {
    pub students: Vec<CreateStudentRequest>,
    pub rolls: Vec<CreateRollRequest>,
}

impl ImportDocument {
    /// Validate every entry, reporting all problems with their position.
    pub fn validate(&self) -> Result<(Vec<NewStudent>, Vec<NewRoll>), RollcallError> {
        let mut problems = Vec::new();
        let mut students = Vec::with_capacity(self.students.len());
        let mut rolls = Vec::with_capacity(self.rolls.len());

        for (i, entry) in self.students.iter().enumerate() {
            match entry.to_new_student() {
                Ok(student) => students.push(student),
                Err(e) => problems.push(format!("students[{}]: {}", i, e)),
            }
        }
        for (i, entry) in self.rolls.iter().enumerate() {
            match entry.to_new_roll() {
                Ok(roll) => rolls.push(roll),
                Err(e) => problems.push(format!("rolls[{}]: {}", i, e)),
            }
        }

        if problems.is_empty() {
            Ok((students, rolls))
        } else {
            Err(RollcallError::Validation(problems))
        }
    }
}

/// Import students and rolls from a JSON file in one transaction.
pub fn cmd_import(db_path: &Path, json_mode: bool, file: &Path) -> Result<(), RollcallError> {
    let file = validate_file_path(file)?;
    validate_file_size(&file, MAX_IMPORT_FILE_SIZE)?;

    let data = std::fs::read_to_string(&file)
        .map_err(|e| RollcallError::Io(format!("Cannot read file: {}", e)))?;
    let document: ImportDocument = serde_json::from_str(&data)
        .map_err(|e| RollcallError::Validation(vec![format!("Invalid import file: {}", e)]))?;
    let (students, rolls) = document.validate()?;

    let store = Store::open(db_path)?;
    let summary = store.import(students, rolls)?;

    if json_mode {
        print_json(&serde_json::json!({
            "success": true,
            "students": summary.students,
            "rolls": summary.rolls,
            "roll_states": summary.roll_states,
        }));
    } else {
        println!(
            "Imported {} students, {} rolls ({} roll states) from {:?}",
            summary.students, summary.rolls, summary.roll_states, file
        );
    }
    Ok(())
}

// =============================================================================
// GROUPS COMMAND
// =============================================================================

/// List groups.
pub fn cmd_groups(db_path: &Path, json_mode: bool) -> Result<(), RollcallError> {
    let store = Store::open(db_path)?;
    let groups = store.list_groups()?;

    if json_mode {
        print_json(&serde_json::json!({ "groups": groups }));
        return Ok(());
    }

    if groups.is_empty() {
        println!("No groups.");
        return Ok(());
    }
    for group in &groups {
        let last_run = group
            .run_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "[{}] {}: {} {} {} in {} week(s), {} student(s), last run {}",
            group.id,
            group.name,
            group.roll_states,
            group.ltmt,
            group.incidents,
            group.number_of_weeks,
            group.student_count,
            last_run
        );
    }
    Ok(())
}

// =============================================================================
// RUN-FILTERS COMMAND
// =============================================================================

/// Recompute the membership of every group and print the summary.
pub fn cmd_run_filters(db_path: &Path, json_mode: bool) -> Result<(), RollcallError> {
    let store = Store::open(db_path)?;
    let summary = store.run_group_filters(Utc::now())?;

    if json_mode {
        print_json(&serde_json::json!({
            "success": true,
            "message": "Group filters ran successfully.",
            "summary": summary,
        }));
        return Ok(());
    }

    println!("Group filters ran successfully.");
    println!("Run at: {}", summary.run_at.to_rfc3339());
    for group in &summary.groups {
        println!(
            "  [{}] {}: {} student(s)",
            group.group_id, group.name, group.student_count
        );
    }
    println!("Total memberships: {}", summary.total_memberships);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn seed_rolls_skip_weekends_and_cover_every_student() {
        let now = DateTime::parse_from_rfc3339("2024-06-14T16:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let (students, rolls) = seed_data(now);

        assert_eq!(students.len(), SEED_STUDENTS.len());
        assert_eq!(rolls.len(), 15);
        for roll in &rolls {
            let weekday = roll.completed_at.weekday();
            assert!(!matches!(weekday, Weekday::Sat | Weekday::Sun));
            assert_eq!(roll.states.len(), SEED_STUDENTS.len());
        }
    }

    #[test]
    fn seeded_groups_find_members() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("seed.redb");
        cmd_seed(&db, true).unwrap();
        assert!(cmd_seed(&db, true).is_err());
        assert_eq!(Store::open(&db).unwrap().list_groups().unwrap().len(), 2);

        let store = Store::open(&db).unwrap();
        let summary = store.run_group_filters(Utc::now()).unwrap();
        assert_eq!(summary.groups.len(), 2);
        assert!(summary.total_memberships > 0);
    }

    #[test]
    fn seed_refuses_a_database_with_only_groups() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("groups.redb");
        {
            let store = Store::open(&db).unwrap();
            let [group, _] = seed_groups();
            store.create_group(group).unwrap();
        }

        let err = cmd_seed(&db, true).unwrap_err();
        assert!(matches!(err, RollcallError::Validation(_)));
        let stats = Store::open(&db).unwrap().stats().unwrap();
        assert_eq!(stats.students, 0);
        assert_eq!(stats.rolls, 0);
        assert_eq!(stats.groups, 1);
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("init.redb");
        cmd_init(&db, false).unwrap();
        assert!(cmd_init(&db, false).is_err());
        cmd_init(&db, true).unwrap();
    }

    #[test]
    fn import_reports_positions_and_writes_nothing_on_error() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("import.redb");
        let file = dir.path().join("bad.json");
        std::fs::write(
            &file,
            r#"{
                "students": [{"first_name": "Ada", "last_name": "Park"}, {"first_name": ""}],
                "rolls": [{"completed_at": "2024-06-10T09:00:00Z", "states": []}]
            }"#,
        )
        .unwrap();

        let err = cmd_import(&db, true, &file).unwrap_err();
        assert_eq!(
            err.to_string(),
            "students[1]: \"first_name\" is not allowed to be empty,\"last_name\" is required"
        );
        assert_eq!(Store::open(&db).unwrap().stats().unwrap().students, 0);
    }

    #[test]
    fn import_commits_students_and_rolls() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("import.redb");
        let file = dir.path().join("good.json");
        std::fs::write(
            &file,
            r#"{
                "students": [{"first_name": "Ada", "last_name": "Park"}],
                "rolls": [{
                    "completed_at": "2024-06-10T09:00:00Z",
                    "states": [{"student_id": 1, "state": "late"}]
                }]
            }"#,
        )
        .unwrap();

        cmd_import(&db, true, &file).unwrap();

        let stats = Store::open(&db).unwrap().stats().unwrap();
        assert_eq!(stats.students, 1);
        assert_eq!(stats.rolls, 1);
        assert_eq!(stats.roll_states, 1);
    }
}
