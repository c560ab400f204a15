use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::ReportConfig;
use crate::workflows::assignments::audit::AuditLog;
use crate::workflows::assignments::ledger::AssignmentLedger;
use crate::workflows::assignments::registry::FacultyRegistry;
use crate::workflows::assignments::{
    assignment_router, ActionType, AdminId, Assignment, AssignmentCoordinator, AssignmentReports,
    AssignmentServices, Database, FacultyAccount, FacultyId, Submission,
    SubmissionId, ADMIN_HEADER,
};

pub(super) struct Fixture {
    pub(super) db: Database,
    pub(super) coordinator: AssignmentCoordinator,
    pub(super) reports: AssignmentReports,
}

pub(super) fn admin() -> AdminId {
    AdminId::from("admin-1")
}

pub(super) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

pub(super) fn faculty(id: &str, max_capacity: u32) -> FacultyAccount {
    FacultyAccount {
        id: FacultyId::from(id),
        name: format!("Reviewer {id}"),
        max_capacity,
        is_available: true,
        current_load: 0,
    }
}

/// Submissions are spaced a minute apart in the order given, so the first id is oldest.
pub(super) fn submission(id: &str, position: i64) -> Submission {
    Submission {
        id: SubmissionId::from(id),
        candidate: format!("Candidate {id}"),
        course: "rust-fundamentals".to_string(),
        level: "intermediate".to_string(),
        submitted_at: base_time() + Duration::minutes(position),
        status: "pending".to_string(),
        weight: 1,
    }
}

pub(super) fn fixture(faculty_rows: &[(&str, u32)], submission_ids: &[&str]) -> Fixture {
    let db = Database::open_in_memory().expect("in-memory database");
    let coordinator = AssignmentCoordinator::new(db.clone());
    let reports = AssignmentReports::new(db.clone(), &ReportConfig::default());

    for (id, capacity) in faculty_rows {
        coordinator
            .register_faculty(&faculty(id, *capacity))
            .expect("register faculty");
    }
    for (position, id) in submission_ids.iter().enumerate() {
        coordinator
            .register_submission(&submission(id, position as i64))
            .expect("register submission");
    }

    Fixture {
        db,
        coordinator,
        reports,
    }
}

impl Fixture {
    pub(super) fn add_submission(&self, id: &str, position: i64) {
        self.coordinator
            .register_submission(&submission(id, position))
            .expect("register submission");
    }

    pub(super) fn assignment(&self, id: &str) -> Option<Assignment> {
        self.db
            .read(|conn| AssignmentLedger::new(conn).find(&SubmissionId::from(id)))
            .expect("ledger read")
    }

    pub(super) fn live_load(&self, id: &str) -> u32 {
        self.db
            .read(|conn| FacultyRegistry::new(conn).live_load(&FacultyId::from(id)))
            .expect("load read")
    }

    pub(super) fn cached_load(&self, id: &str) -> u32 {
        self.db
            .read(|conn| FacultyRegistry::new(conn).get(&FacultyId::from(id)))
            .expect("faculty read")
            .expect("faculty exists")
            .current_load
    }

    pub(super) fn audit_count(&self) -> u64 {
        self.db
            .read(|conn| AuditLog::new(conn).count())
            .expect("audit count")
    }

    pub(super) fn actions_for(&self, id: &str) -> Vec<ActionType> {
        self.db
            .read(|conn| AuditLog::new(conn).history(&SubmissionId::from(id)))
            .expect("history")
            .into_iter()
            .map(|entry| entry.action_type)
            .collect()
    }

    /// Overwrites the cached load, simulating drift from an out-of-band writer.
    pub(super) fn corrupt_cached_load(&self, id: &str, load: u32) {
        self.db
            .write(|tx| FacultyRegistry::new(tx).store_current_load(&FacultyId::from(id), load))
            .expect("cache write");
    }

    pub(super) fn services(&self) -> AssignmentServices {
        AssignmentServices::new(self.db.clone(), &ReportConfig::default())
    }

    pub(super) fn router(&self) -> axum::Router {
        assignment_router(self.services())
    }
}

pub(super) fn ids(raw: &[&str]) -> Vec<SubmissionId> {
    raw.iter().map(|id| SubmissionId::from(*id)).collect()
}

pub(super) fn admin_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ADMIN_HEADER, "admin-1");
    match body {
        Some(payload) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&payload).expect("json body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
