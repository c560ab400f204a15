use std::thread;

use super::common::*;

use crate::workflows::assignments::{AssignmentError, FacultyId, SubmissionId};

#[test]
fn parallel_bulk_assigns_never_overfill_a_reviewer() {
    let submissions: Vec<String> = (0..24).map(|n| format!("s{n:02}")).collect();
    let refs: Vec<&str> = submissions.iter().map(String::as_str).collect();
    let fx = fixture(&[("f1", 5)], &refs);

    let assigned: usize = thread::scope(|scope| {
        let handles: Vec<_> = submissions
            .chunks(3)
            .map(|chunk| {
                let coordinator = fx.coordinator.clone();
                let batch: Vec<SubmissionId> =
                    chunk.iter().map(|id| SubmissionId::from(id.as_str())).collect();
                scope.spawn(move || {
                    coordinator
                        .bulk_assign(&admin(), &batch, &FacultyId::from("f1"))
                        .expect("bulk assign")
                        .assigned
                        .len()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finished"))
            .sum()
    });

    assert_eq!(assigned, 5);
    assert_eq!(fx.live_load("f1"), 5);
    assert_eq!(fx.cached_load("f1"), 5);
    assert_eq!(fx.audit_count(), 5);
}

#[test]
fn competing_reassigns_leave_exactly_one_winner_per_slot() {
    let fx = fixture(&[("f1", 4), ("f2", 1), ("f3", 4)], &["s1", "s2", "s3", "s4"]);
    fx.coordinator
        .bulk_assign(
            &admin(),
            &ids(&["s1", "s2", "s3", "s4"]),
            &FacultyId::from("f1"),
        )
        .expect("seed");

    let results: Vec<Result<(), AssignmentError>> = thread::scope(|scope| {
        let handles: Vec<_> = ["s1", "s2", "s3", "s4"]
            .into_iter()
            .map(|id| {
                let coordinator = fx.coordinator.clone();
                scope.spawn(move || {
                    coordinator
                        .reassign(&admin(), &SubmissionId::from(id), &FacultyId::from("f2"))
                        .map(|_| ())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finished"))
            .collect()
    });

    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results.iter().filter_map(|result| result.as_ref().err()).all(
        |err| matches!(err, AssignmentError::CapacityExceeded { .. })
    ));
    assert_eq!(fx.live_load("f2"), 1);
    assert_eq!(fx.live_load("f1"), 3);
}

#[test]
fn auto_assign_racing_bulk_assign_keeps_one_row_per_submission() {
    let fx = fixture(&[("f1", 10), ("f2", 10)], &["s1", "s2", "s3", "s4", "s5", "s6"]);

    thread::scope(|scope| {
        let auto = fx.coordinator.clone();
        let bulk = fx.coordinator.clone();
        scope.spawn(move || auto.auto_assign(&admin()).map(|_| ()));
        scope.spawn(move || {
            bulk.bulk_assign(
                &admin(),
                &ids(&["s1", "s2", "s3", "s4", "s5", "s6"]),
                &FacultyId::from("f2"),
            )
            .map(|_| ())
        });
    });

    let total = fx.live_load("f1") + fx.live_load("f2");
    assert_eq!(total, 6);
    for id in ["s1", "s2", "s3", "s4", "s5", "s6"] {
        assert!(fx.assignment(id).is_some());
    }
    assert!(fx.audit_count() >= 6);
}
