//! Faculty assignment workflow: routes submissions to reviewers under capacity ceilings,
//! keeps the ledger consistent across concurrent administrators, and records every move.

pub mod audit;
pub mod balancer;
pub mod coordinator;
pub mod domain;
pub mod ledger;
pub mod registry;
pub mod reports;
pub mod router;
pub mod store;

#[cfg(test)]
mod tests;

pub use audit::{AuditQuery, Page, PageRequest, Pagination};
pub use balancer::{balance, BalancePlan, FacultyLoad, Placement, WorkItem};
pub use coordinator::{
    AssignmentCoordinator, AssignmentError, AutoAssignOutcome, BulkAssignFailure,
    BulkAssignOutcome, LoadCorrection, ReassignOutcome, RedistributeOutcome, SkipReason,
};
pub use domain::{
    ActionType, AdminId, Assignment, AssignmentLogEntry, AssignmentStatus, FacultyAccount,
    FacultyId, Submission, SubmissionId,
};
pub use reports::{AssignmentReports, FacultyLoadEntry, SubmissionAssignmentView, SubmissionQuery};
pub use router::{assignment_router, AssignmentServices, ADMIN_HEADER};
pub use store::{Database, StoreError};
