use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use serde::{Serialize, Serializer};
use tracing::{error, info, warn};

use super::audit::{AuditLog, LogDraft};
use super::balancer::{balance, FacultyLoad, WorkItem};
use super::domain::{
    ActionType, AdminId, Assignment, AssignmentStatus, FacultyAccount, FacultyId, Submission,
    SubmissionId, MAX_CAPACITY, MIN_CAPACITY,
};
use super::ledger::{AssignmentLedger, SubmissionCatalog};
use super::registry::FacultyRegistry;
use super::store::{Database, StoreError};

/// Single entry point for every ledger mutation.
///
/// Each operation runs in one write transaction: faculty rows are read first in id order,
/// assignment rows next in submission-id order, and every row update is version-checked.
/// The audit entry and the refreshed load cache commit with the mutation or not at all.
#[derive(Clone)]
pub struct AssignmentCoordinator {
    db: Database,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutoAssignOutcome {
    pub assigned_count: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReassignOutcome {
    pub submission_id: SubmissionId,
    pub from_faculty_id: FacultyId,
    pub new_faculty_id: FacultyId,
    pub version: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RedistributeOutcome {
    pub redistributed_count: usize,
    pub skipped: usize,
}

/// Why one item of a bulk request was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SubmissionNotFound,
    AlreadyEvaluated,
    AlreadyAssigned,
    AtCapacity,
    VersionConflict,
}

impl SkipReason {
    pub const fn label(self) -> &'static str {
        match self {
            SkipReason::SubmissionNotFound => "Submission not found",
            SkipReason::AlreadyEvaluated => "Already evaluated",
            SkipReason::AlreadyAssigned => "Already assigned to this faculty",
            SkipReason::AtCapacity => "Faculty at max capacity",
            SkipReason::VersionConflict => "Version conflict",
        }
    }
}

impl Serialize for SkipReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkAssignFailure {
    pub submission_id: SubmissionId,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkAssignOutcome {
    pub assigned: Vec<SubmissionId>,
    pub errors: Vec<BulkAssignFailure>,
}

impl BulkAssignOutcome {
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }

    fn skip(&mut self, submission_id: &SubmissionId, reason: SkipReason) {
        self.errors.push(BulkAssignFailure {
            submission_id: submission_id.clone(),
            reason,
        });
    }
}

/// A cached load that disagreed with the ledger and was rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadCorrection {
    pub faculty_id: FacultyId,
    pub previous: u32,
    pub current: u32,
}

/// Failures reported by [`AssignmentCoordinator`]. Everything except `Store` is an expected
/// business outcome.
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("faculty '{0}' is not accepting assignments")]
    Unavailable(FacultyId),
    #[error("faculty '{faculty_id}' is at capacity ({load}/{capacity})")]
    CapacityExceeded {
        faculty_id: FacultyId,
        load: u32,
        capacity: u32,
    },
    #[error("nothing to change for submission '{submission_id}': {detail}")]
    NoOp {
        submission_id: SubmissionId,
        detail: &'static str,
    },
    #[error("submission '{0}' has already been evaluated")]
    AlreadyEvaluated(SubmissionId),
    #[error("cannot move an assignment from {from} to {to}")]
    InvalidTransition {
        from: AssignmentStatus,
        to: AssignmentStatus,
    },
    #[error("max capacity must be between 1 and 100, got {0}")]
    InvalidCapacity(u32),
    #[error("assignment for '{submission_id}' changed since version {expected}")]
    VersionConflict {
        submission_id: SubmissionId,
        expected: u32,
    },
    #[error("No available faculty with capacity")]
    NoCapacityAnywhere,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AssignmentError {
    pub fn code(&self) -> &'static str {
        match self {
            AssignmentError::NotFound { .. } => "not_found",
            AssignmentError::Unavailable(_) => "unavailable",
            AssignmentError::CapacityExceeded { .. } => "capacity_exceeded",
            AssignmentError::NoOp { .. } => "no_op",
            AssignmentError::AlreadyEvaluated(_) => "already_evaluated",
            AssignmentError::InvalidTransition { .. } => "invalid_transition",
            AssignmentError::InvalidCapacity(_) => "invalid_capacity",
            AssignmentError::VersionConflict { .. } => "version_conflict",
            AssignmentError::NoCapacityAnywhere => "no_capacity_anywhere",
            AssignmentError::Store(_) => "storage_error",
        }
    }

    fn faculty_not_found(id: &FacultyId) -> Self {
        AssignmentError::NotFound {
            entity: "faculty",
            id: id.to_string(),
        }
    }

    fn submission_not_found(id: &SubmissionId) -> Self {
        AssignmentError::NotFound {
            entity: "submission",
            id: id.to_string(),
        }
    }

    fn assignment_not_found(id: &SubmissionId) -> Self {
        AssignmentError::NotFound {
            entity: "assignment",
            id: id.to_string(),
        }
    }
}

fn log_failure(operation: &'static str, admin: &AdminId, err: &AssignmentError) {
    match err {
        AssignmentError::Store(source) => {
            error!(operation, admin_id = %admin, error = %source, "assignment operation failed")
        }
        AssignmentError::VersionConflict { .. } => {
            warn!(operation, admin_id = %admin, code = err.code(), reason = %err, "assignment operation rejected")
        }
        other => {
            info!(operation, admin_id = %admin, code = other.code(), reason = %other, "assignment operation rejected")
        }
    }
}

fn validate_capacity(max_capacity: u32) -> Result<(), AssignmentError> {
    if (MIN_CAPACITY..=MAX_CAPACITY).contains(&max_capacity) {
        Ok(())
    } else {
        Err(AssignmentError::InvalidCapacity(max_capacity))
    }
}

/// Target must be accepting work and have room for `weight` on top of its live load.
fn ensure_room(
    registry: &FacultyRegistry<'_>,
    target: &FacultyAccount,
    weight: u32,
) -> Result<(), AssignmentError> {
    if !target.is_available {
        return Err(AssignmentError::Unavailable(target.id.clone()));
    }
    let load = registry.live_load(&target.id)?;
    if load.saturating_add(weight) > target.max_capacity {
        return Err(AssignmentError::CapacityExceeded {
            faculty_id: target.id.clone(),
            load,
            capacity: target.max_capacity,
        });
    }
    Ok(())
}

fn refresh_loads<'a>(
    registry: &FacultyRegistry<'_>,
    faculty: impl IntoIterator<Item = &'a FacultyId>,
) -> Result<(), StoreError> {
    let unique: BTreeSet<&FacultyId> = faculty.into_iter().collect();
    for id in unique {
        registry.refresh_current_load(id)?;
    }
    Ok(())
}

impl AssignmentCoordinator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Routes every waiting submission to the least-loaded reviewer with room.
    pub fn auto_assign(&self, admin: &AdminId) -> Result<AutoAssignOutcome, AssignmentError> {
        let outcome = self
            .db
            .write(|tx| {
                let queue = SubmissionCatalog::new(tx).unassigned(None, None)?;
                if queue.is_empty() {
                    return Ok(AutoAssignOutcome::default());
                }

                let registry = FacultyRegistry::new(tx);
                let faculty = registry.list_available_with_capacity()?;
                if faculty.is_empty() {
                    return Err(AssignmentError::NoCapacityAnywhere);
                }
                let faculty_ids: Vec<FacultyId> =
                    faculty.iter().map(|slot| slot.faculty_id.clone()).collect();
                registry.lock_many(&faculty_ids)?;

                let items: Vec<WorkItem> = queue
                    .iter()
                    .map(|submission| WorkItem::new(submission.id.clone(), submission.weight))
                    .collect();
                let plan = balance(&items, &faculty);

                let ledger = AssignmentLedger::new(tx);
                let audit = AuditLog::new(tx);
                let now = Utc::now();
                let mut outcome = AutoAssignOutcome {
                    assigned_count: 0,
                    skipped: plan.unassignable.len(),
                };
                for placement in &plan.placements {
                    let row = Assignment::new(
                        placement.submission_id.clone(),
                        placement.faculty_id.clone(),
                        AssignmentStatus::Pending,
                        placement.weight,
                        now,
                    );
                    if !ledger.insert(&row)? {
                        warn!(submission_id = %row.submission_id, "assignment appeared mid-pass, skipping");
                        outcome.skipped += 1;
                        continue;
                    }
                    audit.record(
                        LogDraft {
                            submission_id: &row.submission_id,
                            action_type: ActionType::AutoAssign,
                            from_faculty_id: None,
                            to_faculty_id: Some(&row.faculty_id),
                            admin_id: Some(admin),
                            notes: "least-loaded auto assignment".to_string(),
                        },
                        now,
                    )?;
                    outcome.assigned_count += 1;
                }

                refresh_loads(&registry, &faculty_ids)?;
                Ok(outcome)
            })
            .inspect_err(|err| log_failure("auto_assign", admin, err))?;

        info!(
            admin_id = %admin,
            assigned = outcome.assigned_count,
            skipped = outcome.skipped,
            "auto-assign completed"
        );
        Ok(outcome)
    }

    /// Binds one submission to `faculty_id` with status `assigned`, moving it if another
    /// reviewer held it.
    pub fn manual_assign(
        &self,
        admin: &AdminId,
        submission_id: &SubmissionId,
        faculty_id: &FacultyId,
    ) -> Result<Assignment, AssignmentError> {
        let stored = self
            .db
            .write(|tx| {
                let registry = FacultyRegistry::new(tx);
                let ledger = AssignmentLedger::new(tx);

                let submission = SubmissionCatalog::new(tx)
                    .get(submission_id)?
                    .ok_or_else(|| AssignmentError::submission_not_found(submission_id))?;
                let previous = ledger.find(submission_id)?;

                let mut to_lock = vec![faculty_id.clone()];
                to_lock.extend(previous.as_ref().map(|row| row.faculty_id.clone()));
                let locked = registry.lock_many(&to_lock)?;
                let target = locked
                    .iter()
                    .find(|account| &account.id == faculty_id)
                    .ok_or_else(|| AssignmentError::faculty_not_found(faculty_id))?;

                let current = ledger
                    .lock_rows(std::slice::from_ref(submission_id))?
                    .remove(submission_id);
                if let Some(row) = &current {
                    if row.status == AssignmentStatus::Evaluated {
                        return Err(AssignmentError::AlreadyEvaluated(submission_id.clone()));
                    }
                    if &row.faculty_id == faculty_id {
                        return Err(AssignmentError::NoOp {
                            submission_id: submission_id.clone(),
                            detail: "already assigned to this faculty",
                        });
                    }
                }

                let weight = current
                    .as_ref()
                    .map_or(submission.weight, |row| row.submission_weight);
                ensure_room(&registry, target, weight)?;

                let now = Utc::now();
                let stored = match &current {
                    Some(row) => {
                        let mut next = row.moved_to(faculty_id.clone(), now);
                        next.status = AssignmentStatus::Assigned;
                        ledger
                            .update(&next)?
                            .ok_or_else(|| AssignmentError::VersionConflict {
                                submission_id: submission_id.clone(),
                                expected: row.version,
                            })?
                    }
                    None => {
                        let row = Assignment::new(
                            submission_id.clone(),
                            faculty_id.clone(),
                            AssignmentStatus::Assigned,
                            weight,
                            now,
                        );
                        if !ledger.insert(&row)? {
                            return Err(AssignmentError::VersionConflict {
                                submission_id: submission_id.clone(),
                                expected: 0,
                            });
                        }
                        row
                    }
                };

                let from = current.as_ref().map(|row| &row.faculty_id);
                AuditLog::new(tx).record(
                    LogDraft {
                        submission_id,
                        action_type: ActionType::ManualAssign,
                        from_faculty_id: from,
                        to_faculty_id: Some(faculty_id),
                        admin_id: Some(admin),
                        notes: "manual assignment".to_string(),
                    },
                    now,
                )?;

                refresh_loads(&registry, from.into_iter().chain(Some(faculty_id)))?;
                Ok(stored)
            })
            .inspect_err(|err| log_failure("manual_assign", admin, err))?;

        info!(
            admin_id = %admin,
            submission_id = %submission_id,
            faculty_id = %faculty_id,
            version = stored.version,
            "submission assigned manually"
        );
        Ok(stored)
    }

    /// Moves an existing assignment to `new_faculty_id`.
    pub fn reassign(
        &self,
        admin: &AdminId,
        submission_id: &SubmissionId,
        new_faculty_id: &FacultyId,
    ) -> Result<ReassignOutcome, AssignmentError> {
        let outcome = self
            .db
            .write(|tx| {
                let registry = FacultyRegistry::new(tx);
                let ledger = AssignmentLedger::new(tx);

                let seen = ledger
                    .find(submission_id)?
                    .ok_or_else(|| AssignmentError::assignment_not_found(submission_id))?;
                if &seen.faculty_id == new_faculty_id {
                    return Err(AssignmentError::NoOp {
                        submission_id: submission_id.clone(),
                        detail: "already assigned to this faculty",
                    });
                }

                let locked =
                    registry.lock_many(&[seen.faculty_id.clone(), new_faculty_id.clone()])?;
                let target = locked
                    .iter()
                    .find(|account| &account.id == new_faculty_id)
                    .ok_or_else(|| AssignmentError::faculty_not_found(new_faculty_id))?;

                let current = ledger
                    .lock_rows(std::slice::from_ref(submission_id))?
                    .remove(submission_id)
                    .ok_or_else(|| AssignmentError::assignment_not_found(submission_id))?;
                if current.status == AssignmentStatus::Evaluated {
                    return Err(AssignmentError::AlreadyEvaluated(submission_id.clone()));
                }
                ensure_room(&registry, target, current.submission_weight)?;

                let now = Utc::now();
                let next = current.moved_to(new_faculty_id.clone(), now);
                let stored = ledger.update(&next)?.ok_or_else(|| {
                    AssignmentError::VersionConflict {
                        submission_id: submission_id.clone(),
                        expected: current.version,
                    }
                })?;

                AuditLog::new(tx).record(
                    LogDraft {
                        submission_id,
                        action_type: ActionType::Reassign,
                        from_faculty_id: Some(&current.faculty_id),
                        to_faculty_id: Some(new_faculty_id),
                        admin_id: Some(admin),
                        notes: format!("reassigned from {}", current.faculty_id),
                    },
                    now,
                )?;
                refresh_loads(&registry, [&current.faculty_id, new_faculty_id])?;

                Ok(ReassignOutcome {
                    submission_id: submission_id.clone(),
                    from_faculty_id: current.faculty_id,
                    new_faculty_id: new_faculty_id.clone(),
                    version: stored.version,
                })
            })
            .inspect_err(|err| log_failure("reassign", admin, err))?;

        info!(
            admin_id = %admin,
            submission_id = %submission_id,
            from_faculty_id = %outcome.from_faculty_id,
            faculty_id = %outcome.new_faculty_id,
            "submission reassigned"
        );
        Ok(outcome)
    }

    /// Spreads `from_faculty_id`'s unstarted work across the other available reviewers.
    /// Rows that fit nowhere stay put and are counted as skipped.
    pub fn redistribute(
        &self,
        admin: &AdminId,
        from_faculty_id: &FacultyId,
    ) -> Result<RedistributeOutcome, AssignmentError> {
        let outcome = self
            .db
            .write(|tx| {
                let registry = FacultyRegistry::new(tx);
                let ledger = AssignmentLedger::new(tx);

                registry
                    .get(from_faculty_id)?
                    .ok_or_else(|| AssignmentError::faculty_not_found(from_faculty_id))?;
                let rows = ledger.unstarted_for_faculty(from_faculty_id)?;
                if rows.is_empty() {
                    return Ok(RedistributeOutcome::default());
                }

                let targets: Vec<FacultyLoad> = registry
                    .list_available_with_capacity()?
                    .into_iter()
                    .filter(|slot| &slot.faculty_id != from_faculty_id)
                    .collect();
                let mut touched: Vec<FacultyId> =
                    targets.iter().map(|slot| slot.faculty_id.clone()).collect();
                touched.push(from_faculty_id.clone());
                registry.lock_many(&touched)?;

                let ids: Vec<SubmissionId> =
                    rows.iter().map(|row| row.submission_id.clone()).collect();
                let mut locked = ledger.lock_rows(&ids)?;

                let items: Vec<WorkItem> = rows
                    .iter()
                    .map(|row| WorkItem::new(row.submission_id.clone(), row.submission_weight))
                    .collect();
                let plan = balance(&items, &targets);

                let audit = AuditLog::new(tx);
                let now = Utc::now();
                let mut moved = 0;
                for placement in &plan.placements {
                    let Some(current) = locked.remove(&placement.submission_id) else {
                        continue;
                    };
                    let next = current.moved_to(placement.faculty_id.clone(), now);
                    if ledger.update(&next)?.is_none() {
                        warn!(
                            submission_id = %placement.submission_id,
                            expected = current.version,
                            "version moved during redistribution, leaving row in place"
                        );
                        continue;
                    }
                    audit.record(
                        LogDraft {
                            submission_id: &placement.submission_id,
                            action_type: ActionType::Redistribute,
                            from_faculty_id: Some(from_faculty_id),
                            to_faculty_id: Some(&placement.faculty_id),
                            admin_id: Some(admin),
                            notes: format!("redistributed from {from_faculty_id}"),
                        },
                        now,
                    )?;
                    moved += 1;
                }

                if moved > 0 {
                    refresh_loads(&registry, &touched)?;
                }
                Ok(RedistributeOutcome {
                    redistributed_count: moved,
                    skipped: rows.len() - moved,
                })
            })
            .inspect_err(|err| log_failure("redistribute", admin, err))?;

        info!(
            admin_id = %admin,
            faculty_id = %from_faculty_id,
            redistributed = outcome.redistributed_count,
            skipped = outcome.skipped,
            "redistribution completed"
        );
        Ok(outcome)
    }

    /// Assigns many submissions to one reviewer, reporting each item that could not be
    /// placed instead of failing the batch.
    pub fn bulk_assign(
        &self,
        admin: &AdminId,
        submission_ids: &[SubmissionId],
        faculty_id: &FacultyId,
    ) -> Result<BulkAssignOutcome, AssignmentError> {
        let outcome = self
            .db
            .write(|tx| {
                let registry = FacultyRegistry::new(tx);
                let ledger = AssignmentLedger::new(tx);
                let catalog = SubmissionCatalog::new(tx);

                let mut seen = HashSet::new();
                let requested: Vec<&SubmissionId> = submission_ids
                    .iter()
                    .filter(|id| seen.insert(*id))
                    .collect();

                let mut to_lock = vec![faculty_id.clone()];
                for id in &requested {
                    if let Some(row) = ledger.find(id)? {
                        to_lock.push(row.faculty_id);
                    }
                }
                let locked_faculty = registry.lock_many(&to_lock)?;
                let target = locked_faculty
                    .iter()
                    .find(|account| &account.id == faculty_id)
                    .ok_or_else(|| AssignmentError::faculty_not_found(faculty_id))?;
                if !target.is_available {
                    return Err(AssignmentError::Unavailable(faculty_id.clone()));
                }
                let mut load = registry.live_load(faculty_id)?;
                let existing = ledger.lock_rows(submission_ids)?;

                let audit = AuditLog::new(tx);
                let now = Utc::now();
                let mut outcome = BulkAssignOutcome::default();
                let mut previous_owners: Vec<FacultyId> = Vec::new();

                for id in requested {
                    let Some(submission) = catalog.get(id)? else {
                        outcome.skip(id, SkipReason::SubmissionNotFound);
                        continue;
                    };
                    let current = existing.get(id);
                    if let Some(row) = current {
                        if row.status == AssignmentStatus::Evaluated {
                            outcome.skip(id, SkipReason::AlreadyEvaluated);
                            continue;
                        }
                        if &row.faculty_id == faculty_id {
                            outcome.skip(id, SkipReason::AlreadyAssigned);
                            continue;
                        }
                    }

                    let weight = current.map_or(submission.weight, |row| row.submission_weight);
                    if load.saturating_add(weight) > target.max_capacity {
                        outcome.skip(id, SkipReason::AtCapacity);
                        continue;
                    }

                    let written = match current {
                        Some(row) => {
                            let mut next = row.moved_to(faculty_id.clone(), now);
                            next.status = AssignmentStatus::Assigned;
                            ledger.update(&next)?.is_some()
                        }
                        None => ledger.insert(&Assignment::new(
                            id.clone(),
                            faculty_id.clone(),
                            AssignmentStatus::Assigned,
                            weight,
                            now,
                        ))?,
                    };
                    if !written {
                        outcome.skip(id, SkipReason::VersionConflict);
                        continue;
                    }

                    load += weight;
                    let from = current.map(|row| &row.faculty_id);
                    audit.record(
                        LogDraft {
                            submission_id: id,
                            action_type: ActionType::BulkAssign,
                            from_faculty_id: from,
                            to_faculty_id: Some(faculty_id),
                            admin_id: Some(admin),
                            notes: "bulk assignment".to_string(),
                        },
                        now,
                    )?;
                    previous_owners.extend(from.cloned());
                    outcome.assigned.push(id.clone());
                }

                registry.store_current_load(faculty_id, load)?;
                refresh_loads(&registry, &previous_owners)?;
                Ok(outcome)
            })
            .inspect_err(|err| log_failure("bulk_assign", admin, err))?;

        info!(
            admin_id = %admin,
            faculty_id = %faculty_id,
            assigned = outcome.assigned.len(),
            skipped = outcome.errors.len(),
            "bulk assignment completed"
        );
        Ok(outcome)
    }

    /// Moves an assignment forward in its lifecycle.
    pub fn update_status(
        &self,
        admin: &AdminId,
        submission_id: &SubmissionId,
        status: AssignmentStatus,
    ) -> Result<Assignment, AssignmentError> {
        let stored = self
            .db
            .write(|tx| {
                let registry = FacultyRegistry::new(tx);
                let ledger = AssignmentLedger::new(tx);

                let seen = ledger
                    .find(submission_id)?
                    .ok_or_else(|| AssignmentError::assignment_not_found(submission_id))?;
                registry.lock(&seen.faculty_id)?;
                let current = ledger
                    .lock_rows(std::slice::from_ref(submission_id))?
                    .remove(submission_id)
                    .ok_or_else(|| AssignmentError::assignment_not_found(submission_id))?;

                if !current.status.can_advance_to(status) {
                    return Err(AssignmentError::InvalidTransition {
                        from: current.status,
                        to: status,
                    });
                }

                let next = Assignment {
                    status,
                    ..current.clone()
                };
                let stored = ledger.update(&next)?.ok_or_else(|| {
                    AssignmentError::VersionConflict {
                        submission_id: submission_id.clone(),
                        expected: current.version,
                    }
                })?;

                AuditLog::new(tx).record(
                    LogDraft {
                        submission_id,
                        action_type: ActionType::StatusChange,
                        from_faculty_id: None,
                        to_faculty_id: Some(&current.faculty_id),
                        admin_id: Some(admin),
                        notes: format!("{} -> {}", current.status, status),
                    },
                    Utc::now(),
                )?;
                registry.refresh_current_load(&current.faculty_id)?;
                Ok(stored)
            })
            .inspect_err(|err| log_failure("update_status", admin, err))?;

        info!(
            admin_id = %admin,
            submission_id = %submission_id,
            status = %stored.status,
            "assignment status changed"
        );
        Ok(stored)
    }

    /// Records an advisory claim. Nothing enforces it; it only tells other reviewers who
    /// has the work open.
    pub fn claim(
        &self,
        admin: &AdminId,
        submission_id: &SubmissionId,
        holder: &str,
    ) -> Result<Assignment, AssignmentError> {
        let holder = holder.trim().to_string();
        self.mutate_claim(admin, submission_id, ActionType::Claim, move |current| {
            if current.status == AssignmentStatus::Evaluated {
                return Err(AssignmentError::AlreadyEvaluated(
                    current.submission_id.clone(),
                ));
            }
            let notes = format!("claimed by {holder}");
            let next = Assignment {
                locked_by: Some(holder),
                locked_at: Some(Utc::now()),
                ..current.clone()
            };
            Ok((next, notes))
        })
    }

    pub fn release(
        &self,
        admin: &AdminId,
        submission_id: &SubmissionId,
    ) -> Result<Assignment, AssignmentError> {
        self.mutate_claim(admin, submission_id, ActionType::Release, |current| {
            let Some(holder) = &current.locked_by else {
                return Err(AssignmentError::NoOp {
                    submission_id: current.submission_id.clone(),
                    detail: "no claim to release",
                });
            };
            let notes = format!("released claim held by {holder}");
            let next = Assignment {
                locked_by: None,
                locked_at: None,
                ..current.clone()
            };
            Ok((next, notes))
        })
    }

    fn mutate_claim(
        &self,
        admin: &AdminId,
        submission_id: &SubmissionId,
        action_type: ActionType,
        change: impl FnOnce(&Assignment) -> Result<(Assignment, String), AssignmentError>,
    ) -> Result<Assignment, AssignmentError> {
        let stored = self
            .db
            .write(|tx| {
                let ledger = AssignmentLedger::new(tx);
                let seen = ledger
                    .find(submission_id)?
                    .ok_or_else(|| AssignmentError::assignment_not_found(submission_id))?;
                FacultyRegistry::new(tx).lock(&seen.faculty_id)?;
                let current = ledger
                    .lock_rows(std::slice::from_ref(submission_id))?
                    .remove(submission_id)
                    .ok_or_else(|| AssignmentError::assignment_not_found(submission_id))?;

                let (next, notes) = change(&current)?;
                let stored = ledger.update(&next)?.ok_or_else(|| {
                    AssignmentError::VersionConflict {
                        submission_id: submission_id.clone(),
                        expected: current.version,
                    }
                })?;

                AuditLog::new(tx).record(
                    LogDraft {
                        submission_id,
                        action_type,
                        from_faculty_id: None,
                        to_faculty_id: Some(&current.faculty_id),
                        admin_id: Some(admin),
                        notes,
                    },
                    Utc::now(),
                )?;
                Ok(stored)
            })
            .inspect_err(|err| log_failure(action_type.as_str(), admin, err))?;

        info!(
            admin_id = %admin,
            submission_id = %submission_id,
            action = %action_type,
            holder = stored.locked_by.as_deref().unwrap_or(""),
            "advisory claim updated"
        );
        Ok(stored)
    }

    /// Rewrites every cached `current_load` from the ledger and reports the rows that were
    /// out of date.
    pub fn recalculate_loads(&self, admin: &AdminId) -> Result<Vec<LoadCorrection>, AssignmentError> {
        let corrections = self
            .db
            .write(|tx| {
                let registry = FacultyRegistry::new(tx);
                let mut corrections = Vec::new();
                for account in registry.list()? {
                    let live = registry.live_load(&account.id)?;
                    if live != account.current_load {
                        registry.store_current_load(&account.id, live)?;
                        corrections.push(LoadCorrection {
                            faculty_id: account.id,
                            previous: account.current_load,
                            current: live,
                        });
                    }
                }
                Ok(corrections)
            })
            .inspect_err(|err| log_failure("recalculate_loads", admin, err))?;

        for correction in &corrections {
            warn!(
                faculty_id = %correction.faculty_id,
                previous = correction.previous,
                current = correction.current,
                "cached load drifted from ledger"
            );
        }
        info!(admin_id = %admin, corrected = corrections.len(), "faculty loads recalculated");
        Ok(corrections)
    }

    /// Existing assignments are left untouched either way.
    pub fn set_availability(
        &self,
        admin: &AdminId,
        faculty_id: &FacultyId,
        is_available: bool,
    ) -> Result<(), AssignmentError> {
        self.db
            .write(|tx| {
                if FacultyRegistry::new(tx).set_availability(faculty_id, is_available)? {
                    Ok(())
                } else {
                    Err(AssignmentError::faculty_not_found(faculty_id))
                }
            })
            .inspect_err(|err| log_failure("set_availability", admin, err))?;
        info!(admin_id = %admin, faculty_id = %faculty_id, is_available, "faculty availability updated");
        Ok(())
    }

    /// Lowering the ceiling below the current load is allowed; it only stops new routing.
    pub fn set_capacity(
        &self,
        admin: &AdminId,
        faculty_id: &FacultyId,
        max_capacity: u32,
    ) -> Result<(), AssignmentError> {
        validate_capacity(max_capacity)
            .and_then(|()| {
                self.db.write(|tx| {
                    if FacultyRegistry::new(tx).set_capacity(faculty_id, max_capacity)? {
                        Ok(())
                    } else {
                        Err(AssignmentError::faculty_not_found(faculty_id))
                    }
                })
            })
            .inspect_err(|err| log_failure("set_capacity", admin, err))?;
        info!(admin_id = %admin, faculty_id = %faculty_id, max_capacity, "faculty capacity updated");
        Ok(())
    }

    /// Syncs a reviewer account from user management.
    pub fn register_faculty(&self, account: &FacultyAccount) -> Result<(), AssignmentError> {
        validate_capacity(account.max_capacity)?;
        self.db.write(|tx| {
            let registry = FacultyRegistry::new(tx);
            registry.upsert(account)?;
            registry.refresh_current_load(&account.id)?;
            Ok::<_, AssignmentError>(())
        })
    }

    /// Syncs a submission record from the grading subsystem.
    pub fn register_submission(&self, submission: &Submission) -> Result<(), AssignmentError> {
        self.db.write(|tx| {
            SubmissionCatalog::new(tx).upsert(submission)?;
            Ok::<_, AssignmentError>(())
        })
    }
}
