use super::common::*;

use crate::workflows::assignments::{
    AssignmentStatus, AuditQuery, FacultyId, PageRequest, SubmissionId, SubmissionQuery,
};

#[test]
fn load_report_counts_active_and_completed_work() {
    let fx = fixture(&[("f1", 4), ("f2", 4)], &["s1", "s2", "s3"]);
    let mut other_course = submission("s4", 3);
    other_course.course = "systems-design".to_string();
    fx.coordinator
        .register_submission(&other_course)
        .expect("s4");
    fx.coordinator
        .bulk_assign(&admin(), &ids(&["s1", "s2", "s4"]), &FacultyId::from("f1"))
        .expect("seed");
    fx.coordinator
        .update_status(&admin(), &SubmissionId::from("s2"), AssignmentStatus::Evaluated)
        .expect("grade");
    fx.coordinator
        .set_availability(&admin(), &FacultyId::from("f2"), false)
        .expect("f2 away");

    let report = fx.reports.faculty_load(false).expect("report");

    assert_eq!(report.len(), 2);
    let f1 = &report[0];
    assert_eq!(f1.id, FacultyId::from("f1"));
    assert_eq!(f1.pending, 2);
    assert_eq!(f1.completed, 1);
    assert_eq!(f1.total, 3);
    assert_eq!(f1.live_load, 2);
    assert_eq!(f1.current_load, 2);
    assert_eq!(
        f1.courses,
        vec!["rust-fundamentals".to_string(), "systems-design".to_string()]
    );
    assert!(!report[1].is_available);

    let available = fx.reports.faculty_load(true).expect("report");
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, FacultyId::from("f1"));
}

#[test]
fn unassigned_queue_excludes_routed_and_ineligible_work() {
    let fx = fixture(&[("f1", 4)], &["s1", "s2", "s3"]);
    let mut withdrawn = submission("s0", -5);
    withdrawn.status = "withdrawn".to_string();
    fx.coordinator
        .register_submission(&withdrawn)
        .expect("withdrawn");
    fx.coordinator
        .manual_assign(&admin(), &SubmissionId::from("s2"), &FacultyId::from("f1"))
        .expect("s2");

    let queue = fx.reports.unassigned_queue(None, None).expect("queue");
    let queued: Vec<&str> = queue.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(queued, vec!["s1", "s3"]);

    assert!(fx
        .reports
        .unassigned_queue(Some("systems-design"), None)
        .expect("queue")
        .is_empty());
}

#[test]
fn submissions_view_joins_and_paginates() {
    let fx = fixture(&[("f1", 4)], &["s1", "s2", "s3", "s4", "s5"]);
    fx.coordinator
        .bulk_assign(&admin(), &ids(&["s1", "s3"]), &FacultyId::from("f1"))
        .expect("seed");

    let first = fx
        .reports
        .submissions(&SubmissionQuery {
            page: PageRequest::new(1, 2),
            ..SubmissionQuery::default()
        })
        .expect("page");
    assert_eq!(first.pagination.total, 5);
    assert_eq!(first.pagination.total_pages, 3);
    assert_eq!(first.data.len(), 2);
    assert_eq!(first.data[0].faculty_id, Some(FacultyId::from("f1")));
    assert_eq!(first.data[0].assignment_status, Some(AssignmentStatus::Assigned));
    assert!(first.data[1].faculty_id.is_none());
    assert!(first.data[1].version.is_none());

    let waiting = fx
        .reports
        .submissions(&SubmissionQuery {
            unassigned_only: true,
            ..SubmissionQuery::default()
        })
        .expect("page");
    let waiting_ids: Vec<&str> = waiting.data.iter().map(|row| row.id.as_str()).collect();
    assert_eq!(waiting_ids, vec!["s2", "s4", "s5"]);

    let held = fx
        .reports
        .submissions(&SubmissionQuery {
            faculty_id: Some(FacultyId::from("f1")),
            ..SubmissionQuery::default()
        })
        .expect("page");
    assert_eq!(held.pagination.total, 2);
}

#[test]
fn audit_view_is_newest_first_and_respects_page_ceiling() {
    let fx = fixture(&[("f1", 4), ("f2", 4)], &["s1", "s2"]);
    fx.coordinator.auto_assign(&admin()).expect("auto assign");
    fx.coordinator
        .reassign(&admin(), &SubmissionId::from("s1"), &FacultyId::from("f2"))
        .expect("reassign");

    let page = fx
        .reports
        .audit_log(&AuditQuery {
            page: PageRequest::new(1, 1_000),
            ..AuditQuery::default()
        })
        .expect("audit page");

    assert_eq!(page.pagination.limit, 100);
    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.data[0].submission_id, SubmissionId::from("s1"));
    assert!(page
        .data
        .windows(2)
        .all(|pair| pair[0].created_at >= pair[1].created_at));

    let trail = fx
        .reports
        .history(&SubmissionId::from("s2"))
        .expect("history");
    assert_eq!(trail.len(), 1);
}
