//! End-to-end scenarios for the assignment workflow driven through the public coordinator,
//! report facade, and HTTP router over a file-backed database.

mod common {
    use chrono::{Duration, TimeZone, Utc};

    use assignment_engine::config::{DatabaseConfig, ReportConfig};
    use assignment_engine::workflows::assignments::{
        AdminId, AssignmentCoordinator, AssignmentReports, Database, FacultyAccount, FacultyId,
        Submission, SubmissionId,
    };

    pub(super) fn admin() -> AdminId {
        AdminId::from("ops-admin")
    }

    pub(super) fn config(dir: &tempfile::TempDir) -> DatabaseConfig {
        DatabaseConfig {
            path: dir.path().join("assignments.db").display().to_string(),
            busy_timeout_ms: 2_000,
        }
    }

    pub(super) fn open(config: &DatabaseConfig) -> (AssignmentCoordinator, AssignmentReports) {
        let db = Database::open(config).expect("open database");
        (
            AssignmentCoordinator::new(db.clone()),
            AssignmentReports::new(db, &ReportConfig::default()),
        )
    }

    pub(super) fn seed(coordinator: &AssignmentCoordinator, faculty: &[(&str, u32)], submissions: &[&str]) {
        for (id, capacity) in faculty {
            coordinator
                .register_faculty(&FacultyAccount {
                    id: FacultyId::from(*id),
                    name: format!("Professor {id}"),
                    max_capacity: *capacity,
                    is_available: true,
                    current_load: 0,
                })
                .expect("faculty");
        }
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap();
        for (position, id) in submissions.iter().enumerate() {
            coordinator
                .register_submission(&Submission {
                    id: SubmissionId::from(*id),
                    candidate: format!("Candidate {id}"),
                    course: "algorithms".to_string(),
                    level: "senior".to_string(),
                    submitted_at: start + Duration::minutes(position as i64),
                    status: "queued".to_string(),
                    weight: 1,
                })
                .expect("submission");
        }
    }
}

use assignment_engine::workflows::assignments::{
    assignment_router, ActionType, AssignmentServices, AuditQuery, Database, FacultyId,
    SubmissionId, ADMIN_HEADER,
};
use assignment_engine::config::ReportConfig;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use tower::ServiceExt;

#[test]
fn ledger_survives_reopening_the_database() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = config(&dir);

    {
        let (coordinator, _) = open(&config);
        seed(&coordinator, &[("f1", 2), ("f2", 2)], &["s1", "s2", "s3"]);
        let outcome = coordinator.auto_assign(&admin()).expect("auto assign");
        assert_eq!(outcome.assigned_count, 3);
    }

    let (coordinator, reports) = open(&config);
    let loads = reports.faculty_load(false).expect("load report");
    let live: Vec<(String, u32)> = loads
        .iter()
        .map(|entry| (entry.id.to_string(), entry.live_load))
        .collect();
    assert_eq!(live, vec![("f1".to_string(), 2), ("f2".to_string(), 1)]);

    let redistributed = coordinator
        .redistribute(&admin(), &FacultyId::from("f1"))
        .expect("redistribute");
    assert_eq!(redistributed.redistributed_count, 1);
    assert_eq!(redistributed.skipped, 1);

    let audit = reports
        .audit_log(&AuditQuery {
            action_type: Some(ActionType::AutoAssign),
            ..AuditQuery::default()
        })
        .expect("audit");
    assert_eq!(audit.pagination.total, 3);
}

#[test]
fn every_faculty_stays_within_capacity_across_mixed_operations() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (coordinator, reports) = open(&config(&dir));
    seed(
        &coordinator,
        &[("f1", 2), ("f2", 3), ("f3", 1)],
        &["s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8"],
    );

    coordinator.auto_assign(&admin()).expect("auto assign");
    let _ = coordinator.reassign(&admin(), &SubmissionId::from("s1"), &FacultyId::from("f3"));
    let _ = coordinator.bulk_assign(
        &admin(),
        &[SubmissionId::from("s7"), SubmissionId::from("s8")],
        &FacultyId::from("f1"),
    );
    let _ = coordinator.redistribute(&admin(), &FacultyId::from("f2"));

    for entry in reports.faculty_load(false).expect("load report") {
        assert!(
            entry.live_load <= entry.max_capacity,
            "{} carries {} of {}",
            entry.id,
            entry.live_load,
            entry.max_capacity
        );
        assert_eq!(entry.live_load, entry.current_load);
    }
}

#[tokio::test]
async fn http_surface_drives_the_workflow() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = config(&dir);
    let (coordinator, _) = open(&config);
    seed(&coordinator, &[("f1", 2), ("f2", 2)], &["s1", "s2", "s3"]);

    let db = Database::open(&config).expect("second handle");
    let router = assignment_router(AssignmentServices::new(db, &ReportConfig::default()));

    let response = router
        .clone()
        .oneshot(
            Request::post("/api/v1/assignments/auto")
                .header(ADMIN_HEADER, "ops-admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::get("/api/v1/submissions/unassigned")
                .header(ADMIN_HEADER, "ops-admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    let queue: serde_json::Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(queue, serde_json::json!([]));
}
