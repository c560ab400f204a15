use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a candidate submission owned by the grading subsystem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

/// Identifier of a faculty reviewer account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FacultyId(pub String);

/// Verified administrator identity handed over by the authentication gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdminId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(SubmissionId);
string_id!(FacultyId);
string_id!(AdminId);

/// Submission statuses that make a submission eligible for routing.
pub const ASSIGNABLE_SUBMISSION_STATUSES: [&str; 2] = ["pending", "queued"];

/// Allowed range for a reviewer's concurrent workload ceiling.
pub const MIN_CAPACITY: u32 = 1;
pub const MAX_CAPACITY: u32 = 100;

/// Candidate work as exposed by the grading subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    #[serde(default)]
    pub candidate: String,
    pub course: String,
    pub level: String,
    pub submitted_at: DateTime<Utc>,
    pub status: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

pub(crate) fn default_weight() -> u32 {
    1
}

/// Reviewer account fields the engine reads and patches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacultyAccount {
    pub id: FacultyId,
    pub name: String,
    pub max_capacity: u32,
    pub is_available: bool,
    /// Cached copy of the ledger-derived load. Never trusted for capacity checks.
    #[serde(default)]
    pub current_load: u32,
}

/// Lifecycle of one assignment. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Assigned,
    InProgress,
    Evaluated,
}

impl AssignmentStatus {
    /// Statuses that count toward a reviewer's load.
    pub const ACTIVE: [AssignmentStatus; 3] = [
        AssignmentStatus::Pending,
        AssignmentStatus::Assigned,
        AssignmentStatus::InProgress,
    ];

    /// Work the reviewer has not opened yet and that redistribution may still move.
    pub const UNSTARTED: [AssignmentStatus; 2] =
        [AssignmentStatus::Pending, AssignmentStatus::Assigned];

    pub const fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Evaluated => "evaluated",
        }
    }

    pub fn can_advance_to(self, next: AssignmentStatus) -> bool {
        next > self
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(AssignmentStatus::Pending),
            "assigned" => Ok(AssignmentStatus::Assigned),
            "in_progress" => Ok(AssignmentStatus::InProgress),
            "evaluated" => Ok(AssignmentStatus::Evaluated),
            other => Err(UnknownVariant {
                kind: "assignment status",
                value: other.to_string(),
            }),
        }
    }
}

/// Row of the assignment ledger binding one submission to one reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub submission_id: SubmissionId,
    pub faculty_id: FacultyId,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub version: u32,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub reallocation_count: u32,
    pub submission_weight: u32,
}

impl Assignment {
    pub fn new(
        submission_id: SubmissionId,
        faculty_id: FacultyId,
        status: AssignmentStatus,
        weight: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            submission_id,
            faculty_id,
            status,
            assigned_at: now,
            version: 1,
            locked_by: None,
            locked_at: None,
            reallocation_count: 0,
            submission_weight: weight,
        }
    }

    /// Copy of this row bound to another reviewer. The advisory claim belongs to the
    /// previous holder and is dropped.
    pub fn moved_to(&self, faculty_id: FacultyId, now: DateTime<Utc>) -> Self {
        let status = match self.status {
            AssignmentStatus::InProgress => AssignmentStatus::Assigned,
            other => other,
        };
        Self {
            faculty_id,
            status,
            assigned_at: now,
            locked_by: None,
            locked_at: None,
            reallocation_count: self.reallocation_count + 1,
            ..self.clone()
        }
    }
}

/// Kinds of ledger mutation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AutoAssign,
    ManualAssign,
    Reassign,
    Redistribute,
    BulkAssign,
    StatusChange,
    Claim,
    Release,
}

impl ActionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ActionType::AutoAssign => "auto_assign",
            ActionType::ManualAssign => "manual_assign",
            ActionType::Reassign => "reassign",
            ActionType::Redistribute => "redistribute",
            ActionType::BulkAssign => "bulk_assign",
            ActionType::StatusChange => "status_change",
            ActionType::Claim => "claim",
            ActionType::Release => "release",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "auto_assign" => Ok(ActionType::AutoAssign),
            "manual_assign" => Ok(ActionType::ManualAssign),
            "reassign" => Ok(ActionType::Reassign),
            "redistribute" => Ok(ActionType::Redistribute),
            "bulk_assign" => Ok(ActionType::BulkAssign),
            "status_change" => Ok(ActionType::StatusChange),
            "claim" => Ok(ActionType::Claim),
            "release" => Ok(ActionType::Release),
            other => Err(UnknownVariant {
                kind: "action type",
                value: other.to_string(),
            }),
        }
    }
}

/// Immutable audit record for a single ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentLogEntry {
    pub id: i64,
    pub submission_id: SubmissionId,
    pub action_type: ActionType,
    pub from_faculty_id: Option<FacultyId>,
    pub to_faculty_id: Option<FacultyId>,
    pub admin_id: Option<AdminId>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Raised when a stored or requested label does not map to a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        assert!(AssignmentStatus::Pending.can_advance_to(AssignmentStatus::InProgress));
        assert!(AssignmentStatus::Assigned.can_advance_to(AssignmentStatus::Evaluated));
        assert!(!AssignmentStatus::InProgress.can_advance_to(AssignmentStatus::Assigned));
        assert!(!AssignmentStatus::Evaluated.can_advance_to(AssignmentStatus::Evaluated));
    }

    #[test]
    fn labels_round_trip_through_storage_form() {
        for status in [
            AssignmentStatus::Pending,
            AssignmentStatus::Assigned,
            AssignmentStatus::InProgress,
            AssignmentStatus::Evaluated,
        ] {
            assert_eq!(status.as_str().parse::<AssignmentStatus>(), Ok(status));
        }
        assert!("archived".parse::<AssignmentStatus>().is_err());
        assert_eq!("bulk_assign".parse::<ActionType>(), Ok(ActionType::BulkAssign));
    }

    #[test]
    fn moving_an_in_progress_row_resets_it_for_the_new_reviewer() {
        let now = Utc::now();
        let mut row = Assignment::new(
            SubmissionId::from("s1"),
            FacultyId::from("f1"),
            AssignmentStatus::InProgress,
            1,
            now,
        );
        row.locked_by = Some("f1".to_string());
        row.locked_at = Some(now);

        let moved = row.moved_to(FacultyId::from("f2"), now);

        assert_eq!(moved.faculty_id, FacultyId::from("f2"));
        assert_eq!(moved.status, AssignmentStatus::Assigned);
        assert_eq!(moved.reallocation_count, 1);
        assert_eq!(moved.version, row.version);
        assert!(moved.locked_by.is_none());
    }
}
