//! # redb-backed Attendance Store
//!
//! A disk-backed store for groups, rolls and students using the redb
//! embedded database, providing:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Every mutation runs inside exactly one write transaction. Any error
//! aborts the transaction, so callers never observe a half-applied change.
//! This is what makes the group filter run all-or-nothing across groups.

use crate::filter::evaluate_group;
use crate::primitives::{MAX_STATES_PER_ROLL, NEXT_GROUP_ID, NEXT_ROLL_ID, NEXT_STUDENT_ID};
use crate::{
    Group, GroupId, GroupMember, GroupPatch, GroupRunResult, NewGroup, NewRoll, NewStudent, Roll,
    RollId, RollMark, RollRecord, RollState, RollcallError, RunSummary, StoreStats, Student,
    StudentId, StudentRollState,
};
use chrono::{DateTime, Utc};
use redb::backends::InMemoryBackend;
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata, Table,
    TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

/// Table for groups: GroupId(u64) -> serialized Group bytes
const GROUPS: TableDefinition<u64, &[u8]> = TableDefinition::new("groups");

/// Table for rolls: RollId(u64) -> serialized Roll bytes
const ROLLS: TableDefinition<u64, &[u8]> = TableDefinition::new("rolls");

/// Table for students: StudentId(u64) -> serialized Student bytes
const STUDENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("students");

/// Table for recorded states: (roll_id, student_id) -> state name.
/// Keyed by roll first so one roll's states are a contiguous range.
const STUDENT_ROLL_STATES: TableDefinition<(u64, u64), &str> =
    TableDefinition::new("student_roll_states");

/// Table for derived membership: (group_id, student_id) -> incident_count
const GROUP_STUDENTS: TableDefinition<(u64, u64), u32> = TableDefinition::new("group_students");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Counts reported by a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub students: usize,
    pub rolls: usize,
    pub roll_states: usize,
}

/// The attendance store.
pub struct Store {
    db: Database,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RollcallError> {
        let db = Database::create(path.as_ref())?;
        Self::init(db)
    }

    /// Create a volatile store held entirely in memory.
    pub fn in_memory() -> Result<Self, RollcallError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, RollcallError> {
        // Initialize tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(GROUPS)?;
            let _ = write_txn.open_table(ROLLS)?;
            let _ = write_txn.open_table(STUDENTS)?;
            let _ = write_txn.open_table(STUDENT_ROLL_STATES)?;
            let _ = write_txn.open_table(GROUP_STUDENTS)?;
            let _ = write_txn.open_table(METADATA)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Run `op` in a write transaction, committing on success and aborting on error.
    fn write<T>(
        &self,
        op: impl FnOnce(&WriteTransaction) -> Result<T, RollcallError>,
    ) -> Result<T, RollcallError> {
        let write_txn = self.db.begin_write()?;
        match op(&write_txn) {
            Ok(value) => {
                write_txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = write_txn.abort() {
                    tracing::warn!(error = %abort_err, "write transaction abort failed");
                }
                Err(e)
            }
        }
    }

    fn read<T>(
        &self,
        op: impl FnOnce(&ReadTransaction) -> Result<T, RollcallError>,
    ) -> Result<T, RollcallError> {
        let read_txn = self.db.begin_read()?;
        op(&read_txn)
    }

    // =========================================================================
    // GROUPS
    // =========================================================================

    /// All groups in id order.
    pub fn list_groups(&self) -> Result<Vec<Group>, RollcallError> {
        self.read(|txn| decode_all(&txn.open_table(GROUPS)?))
    }

    /// One group, or `GroupNotFound`.
    pub fn get_group(&self, id: GroupId) -> Result<Group, RollcallError> {
        self.read(|txn| {
            decode_one(&txn.open_table(GROUPS)?, id.0)?.ok_or(RollcallError::GroupNotFound(id))
        })
    }

    /// Persist a new group. Job-owned fields start empty.
    pub fn create_group(&self, input: NewGroup) -> Result<Group, RollcallError> {
        let group = self.write(|txn| insert_group(txn, input))?;
        tracing::info!(group_id = group.id.0, name = %group.name, "group created");
        Ok(group)
    }

    /// Apply a partial update to an existing group.
    pub fn update_group(&self, id: GroupId, patch: GroupPatch) -> Result<Group, RollcallError> {
        if patch.is_empty() {
            return self.get_group(id);
        }
        self.write(|txn| {
            let mut groups = txn.open_table(GROUPS)?;
            let mut group: Group =
                decode_one(&groups, id.0)?.ok_or(RollcallError::GroupNotFound(id))?;
            group.apply(patch);
            put(&mut groups, id.0, &group)?;
            Ok(group)
        })
    }

    /// Remove a group together with its membership rows.
    pub fn delete_group(&self, id: GroupId) -> Result<Group, RollcallError> {
        let removed = self.write(|txn| {
            let group: Group = {
                let mut groups = txn.open_table(GROUPS)?;
                let removed = groups.remove(id.0)?;
                match removed {
                    Some(bytes) => postcard::from_bytes(bytes.value())?,
                    None => return Err(RollcallError::GroupNotFound(id)),
                }
            };

            let mut members = txn.open_table(GROUP_STUDENTS)?;
            let keys = keys_in_range(&members, id.0)?;
            for key in keys {
                members.remove(key)?;
            }
            Ok(group)
        })?;
        tracing::info!(group_id = id.0, "group removed");
        Ok(removed)
    }

    /// Members of a group joined with their student records, in student id order.
    ///
    /// Membership rows whose student record is missing are skipped.
    pub fn group_students(&self, id: GroupId) -> Result<Vec<GroupMember>, RollcallError> {
        self.read(|txn| {
            let groups = txn.open_table(GROUPS)?;
            if groups.get(id.0)?.is_none() {
                return Err(RollcallError::GroupNotFound(id));
            }

            let members = txn.open_table(GROUP_STUDENTS)?;
            let students = txn.open_table(STUDENTS)?;
            let mut out = Vec::new();
            for entry in members.range((id.0, 0u64)..=(id.0, u64::MAX))? {
                let (key, value) = entry?;
                let (_, student_id) = key.value();
                let Some(student) = decode_one::<Student, _>(&students, student_id)? else {
                    tracing::warn!(
                        group_id = id.0,
                        student_id,
                        "group member has no student record, skipping"
                    );
                    continue;
                };
                out.push(GroupMember {
                    id: student.id,
                    full_name: student.full_name(),
                    first_name: student.first_name,
                    last_name: student.last_name,
                    incident_count: value.value(),
                });
            }
            Ok(out)
        })
    }

    // =========================================================================
    // STUDENTS
    // =========================================================================

    /// Persist a new student.
    pub fn create_student(&self, input: NewStudent) -> Result<Student, RollcallError> {
        self.write(|txn| insert_student(txn, input))
    }

    /// One student, or `StudentNotFound`.
    pub fn get_student(&self, id: StudentId) -> Result<Student, RollcallError> {
        self.read(|txn| {
            decode_one(&txn.open_table(STUDENTS)?, id.0)?.ok_or(RollcallError::StudentNotFound(id))
        })
    }

    /// All students in id order.
    pub fn list_students(&self) -> Result<Vec<Student>, RollcallError> {
        self.read(|txn| decode_all(&txn.open_table(STUDENTS)?))
    }

    // =========================================================================
    // ROLLS
    // =========================================================================

    /// Record a roll and all of its states atomically.
    ///
    /// Every referenced student must exist. A student listed twice keeps the
    /// last state given.
    pub fn create_roll(&self, input: NewRoll) -> Result<RollRecord, RollcallError> {
        self.write(|txn| insert_roll(txn, input))
    }

    /// All rolls in id order, each with its recorded states.
    pub fn list_rolls(&self) -> Result<Vec<RollRecord>, RollcallError> {
        self.read(|txn| {
            let rolls: Vec<Roll> = decode_all(&txn.open_table(ROLLS)?)?;
            let mut marks: BTreeMap<RollId, Vec<RollMark>> = BTreeMap::new();
            for record in decode_states(&txn.open_table(STUDENT_ROLL_STATES)?)? {
                marks.entry(record.roll_id).or_default().push(RollMark {
                    student_id: record.student_id,
                    state: record.state,
                });
            }
            Ok(rolls
                .into_iter()
                .map(|roll| RollRecord {
                    states: marks.remove(&roll.id).unwrap_or_default(),
                    id: roll.id,
                    completed_at: roll.completed_at,
                })
                .collect())
        })
    }

    /// The states recorded for one roll, or `RollNotFound`.
    pub fn roll_states(&self, id: RollId) -> Result<Vec<StudentRollState>, RollcallError> {
        self.read(|txn| {
            if txn.open_table(ROLLS)?.get(id.0)?.is_none() {
                return Err(RollcallError::RollNotFound(id));
            }
            let table = txn.open_table(STUDENT_ROLL_STATES)?;
            let mut out = Vec::new();
            for entry in table.range((id.0, 0u64)..=(id.0, u64::MAX))? {
                let (key, value) = entry?;
                out.push(state_record(key.value(), value.value())?);
            }
            Ok(out)
        })
    }

    /// Import students then rolls in one transaction. Nothing is written on error.
    pub fn import(
        &self,
        students: Vec<NewStudent>,
        rolls: Vec<NewRoll>,
    ) -> Result<ImportSummary, RollcallError> {
        let summary = self.write(|txn| insert_batch(txn, students, rolls))?;
        tracing::info!(
            students = summary.students,
            rolls = summary.rolls,
            roll_states = summary.roll_states,
            "import committed"
        );
        Ok(summary)
    }

    /// Load a starter data set into an empty store in one transaction.
    ///
    /// Fails with a validation error if any student or group already exists.
    pub fn seed(
        &self,
        students: Vec<NewStudent>,
        rolls: Vec<NewRoll>,
        groups: Vec<NewGroup>,
    ) -> Result<(ImportSummary, Vec<Group>), RollcallError> {
        let (summary, groups) = self.write(|txn| {
            let has_students = !txn.open_table(STUDENTS)?.is_empty()?;
            let has_groups = !txn.open_table(GROUPS)?.is_empty()?;
            if has_students || has_groups {
                return Err(RollcallError::Validation(vec![
                    "Database is not empty. Seed an empty database.".to_string(),
                ]));
            }
            let summary = insert_batch(txn, students, rolls)?;
            let groups = groups
                .into_iter()
                .map(|group| insert_group(txn, group))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((summary, groups))
        })?;
        tracing::info!(
            students = summary.students,
            rolls = summary.rolls,
            groups = groups.len(),
            "seed committed"
        );
        Ok((summary, groups))
    }

    // =========================================================================
    // GROUP FILTER RUN
    // =========================================================================

    /// Recompute the membership of every group as of `now`.
    ///
    /// All membership rows are cleared and regenerated, and every group's
    /// `run_at` and `student_count` are updated, inside a single write
    /// transaction. If any group fails, no group or membership row changes.
    pub fn run_group_filters(&self, now: DateTime<Utc>) -> Result<RunSummary, RollcallError> {
        let result = self.write(|txn| recompute(txn, now));
        match &result {
            Ok(summary) => tracing::info!(
                groups = summary.groups.len(),
                memberships = summary.total_memberships,
                "group filters committed"
            ),
            Err(e) => tracing::error!(error = %e, "group filter run rolled back"),
        }
        result
    }

    // =========================================================================
    // STATISTICS
    // =========================================================================

    /// Record counts per table.
    pub fn stats(&self) -> Result<StoreStats, RollcallError> {
        self.read(|txn| {
            Ok(StoreStats {
                groups: txn.open_table(GROUPS)?.len()?,
                rolls: txn.open_table(ROLLS)?.len()?,
                students: txn.open_table(STUDENTS)?.len()?,
                roll_states: txn.open_table(STUDENT_ROLL_STATES)?.len()?,
                group_students: txn.open_table(GROUP_STUDENTS)?.len()?,
            })
        })
    }
}

// =============================================================================
// TRANSACTION BODIES
// =============================================================================

fn recompute(txn: &WriteTransaction, now: DateTime<Utc>) -> Result<RunSummary, RollcallError> {
    let rolls: Vec<Roll> = decode_all(&txn.open_table(ROLLS)?)?;
    let states = decode_states(&txn.open_table(STUDENT_ROLL_STATES)?)?;

    let mut members = txn.open_table(GROUP_STUDENTS)?;
    let stale: Vec<(u64, u64)> = members
        .iter()?
        .map(|entry| entry.map(|(key, _)| key.value()))
        .collect::<Result<_, _>>()?;
    for key in stale {
        members.remove(key)?;
    }

    let mut groups = txn.open_table(GROUPS)?;
    let group_ids: Vec<u64> = groups
        .iter()?
        .map(|entry| entry.map(|(key, _)| key.value()))
        .collect::<Result<_, _>>()?;

    let mut summary = RunSummary {
        run_at: now,
        groups: Vec::with_capacity(group_ids.len()),
        total_memberships: 0,
    };

    for id in group_ids {
        let mut group: Group =
            decode_one(&groups, id)?.ok_or(RollcallError::GroupNotFound(GroupId(id)))?;
        let evaluation = evaluate_group(&group, &rolls, &states, now);

        for member in &evaluation.members {
            members.insert(
                (member.group_id.0, member.student_id.0),
                member.incident_count,
            )?;
        }

        group.run_at = Some(now);
        group.student_count = evaluation.student_count();
        put(&mut groups, id, &group)?;

        tracing::debug!(
            group_id = id,
            cutoff = %evaluation.cutoff,
            student_count = group.student_count,
            "group evaluated"
        );
        summary.total_memberships = summary
            .total_memberships
            .saturating_add(group.student_count);
        summary.groups.push(GroupRunResult {
            group_id: group.id,
            name: group.name,
            student_count: group.student_count,
        });
    }

    Ok(summary)
}

fn insert_group(txn: &WriteTransaction, input: NewGroup) -> Result<Group, RollcallError> {
    let id = GroupId(next_id(&mut txn.open_table(METADATA)?, NEXT_GROUP_ID)?);
    let group = Group::from_new(id, input);
    put(&mut txn.open_table(GROUPS)?, id.0, &group)?;
    Ok(group)
}

fn insert_batch(
    txn: &WriteTransaction,
    students: Vec<NewStudent>,
    rolls: Vec<NewRoll>,
) -> Result<ImportSummary, RollcallError> {
    let mut summary = ImportSummary::default();
    for student in students {
        insert_student(txn, student)?;
        summary.students += 1;
    }
    for roll in rolls {
        let record = insert_roll(txn, roll)?;
        summary.rolls += 1;
        summary.roll_states += record.states.len();
    }
    Ok(summary)
}

fn insert_student(txn: &WriteTransaction, input: NewStudent) -> Result<Student, RollcallError> {
    let id = StudentId(next_id(&mut txn.open_table(METADATA)?, NEXT_STUDENT_ID)?);
    let student = Student {
        id,
        first_name: input.first_name,
        last_name: input.last_name,
    };
    put(&mut txn.open_table(STUDENTS)?, id.0, &student)?;
    Ok(student)
}

fn insert_roll(txn: &WriteTransaction, input: NewRoll) -> Result<RollRecord, RollcallError> {
    if input.states.len() > MAX_STATES_PER_ROLL {
        return Err(RollcallError::Validation(vec![format!(
            "\"states\" must contain less than or equal to {} items",
            MAX_STATES_PER_ROLL
        )]));
    }

    {
        let students = txn.open_table(STUDENTS)?;
        for mark in &input.states {
            if students.get(mark.student_id.0)?.is_none() {
                return Err(RollcallError::StudentNotFound(mark.student_id));
            }
        }
    }

    let id = RollId(next_id(&mut txn.open_table(METADATA)?, NEXT_ROLL_ID)?);
    let roll = Roll {
        id,
        completed_at: input.completed_at,
    };
    put(&mut txn.open_table(ROLLS)?, id.0, &roll)?;

    let mut recorded: BTreeMap<StudentId, RollState> = BTreeMap::new();
    {
        let mut table = txn.open_table(STUDENT_ROLL_STATES)?;
        for mark in input.states {
            table.insert((id.0, mark.student_id.0), mark.state.as_str())?;
            recorded.insert(mark.student_id, mark.state);
        }
    }

    Ok(RollRecord {
        id,
        completed_at: roll.completed_at,
        states: recorded
            .into_iter()
            .map(|(student_id, state)| RollMark { student_id, state })
            .collect(),
    })
}

// =============================================================================
// ENCODING HELPERS
// =============================================================================

fn next_id(meta: &mut Table<'_, &'static str, u64>, key: &str) -> Result<u64, RollcallError> {
    let id = meta.get(key)?.map(|v| v.value()).unwrap_or(1);
    meta.insert(key, id.saturating_add(1))?;
    Ok(id)
}

fn put<T: Serialize>(
    table: &mut Table<'_, u64, &'static [u8]>,
    id: u64,
    record: &T,
) -> Result<(), RollcallError> {
    let bytes = postcard::to_allocvec(record)?;
    table.insert(id, bytes.as_slice())?;
    Ok(())
}

fn decode_one<T, Tbl>(table: &Tbl, id: u64) -> Result<Option<T>, RollcallError>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id)? {
        Some(data) => Ok(Some(postcard::from_bytes(data.value())?)),
        None => Ok(None),
    }
}

fn decode_all<T, Tbl>(table: &Tbl) -> Result<Vec<T>, RollcallError>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<u64, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        out.push(postcard::from_bytes(value.value())?);
    }
    Ok(out)
}

fn decode_states<Tbl>(table: &Tbl) -> Result<Vec<StudentRollState>, RollcallError>
where
    Tbl: ReadableTable<(u64, u64), &'static str>,
{
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        out.push(state_record(key.value(), value.value())?);
    }
    Ok(out)
}

fn state_record(
    (roll_id, student_id): (u64, u64),
    state: &str,
) -> Result<StudentRollState, RollcallError> {
    let state = state
        .parse::<RollState>()
        .map_err(|_| RollcallError::Serialization(format!("unknown roll state '{}'", state)))?;
    Ok(StudentRollState {
        roll_id: RollId(roll_id),
        student_id: StudentId(student_id),
        state,
    })
}

fn keys_in_range<Tbl>(table: &Tbl, group_id: u64) -> Result<Vec<(u64, u64)>, RollcallError>
where
    Tbl: ReadableTable<(u64, u64), u32>,
{
    let mut keys = Vec::new();
    for entry in table.range((group_id, 0u64)..=(group_id, u64::MAX))? {
        let (key, _) = entry?;
        keys.push(key.value());
    }
    Ok(keys)
}

// =============================================================================
// TESTS
// =============================================================================
