//! Greedy least-loaded placement of submissions onto reviewers.
//!
//! Pure computation over a load snapshot. The load map lives only for the duration of one
//! [`balance`] call.

use serde::Serialize;

use super::domain::{FacultyId, SubmissionId};

/// One unit of work to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub submission_id: SubmissionId,
    pub weight: u32,
}

impl WorkItem {
    pub fn new(submission_id: SubmissionId, weight: u32) -> Self {
        Self {
            submission_id,
            weight,
        }
    }
}

/// Snapshot of one reviewer's ceiling and load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacultyLoad {
    pub faculty_id: FacultyId,
    pub max_capacity: u32,
    pub current_load: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub submission_id: SubmissionId,
    pub faculty_id: FacultyId,
    pub weight: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalancePlan {
    pub placements: Vec<Placement>,
    pub unassignable: Vec<SubmissionId>,
}

struct Slot<'a> {
    faculty_id: &'a FacultyId,
    capacity: u32,
    load: u32,
}

impl Slot<'_> {
    fn has_room(&self) -> bool {
        self.load < self.capacity
    }

    fn fits(&self, weight: u32) -> bool {
        self.load.saturating_add(weight) <= self.capacity
    }
}

/// Places `items` (expected oldest first) onto `faculty`.
///
/// Each item goes to the reviewer with the smallest load that can still take its weight;
/// equal loads go to the lowest faculty id. Once no reviewer has any room left the
/// remaining items are all reported unassignable. An item heavier than every reviewer's
/// remaining room is unassignable on its own and the pass carries on.
pub fn balance(items: &[WorkItem], faculty: &[FacultyLoad]) -> BalancePlan {
    let mut slots: Vec<Slot<'_>> = faculty
        .iter()
        .map(|entry| Slot {
            faculty_id: &entry.faculty_id,
            capacity: entry.max_capacity,
            load: entry.current_load,
        })
        .collect();

    let mut plan = BalancePlan::default();
    for (position, item) in items.iter().enumerate() {
        if !slots.iter().any(Slot::has_room) {
            plan.unassignable
                .extend(items[position..].iter().map(|rest| rest.submission_id.clone()));
            break;
        }

        let chosen = slots
            .iter_mut()
            .filter(|slot| slot.fits(item.weight))
            .min_by(|a, b| a.load.cmp(&b.load).then_with(|| a.faculty_id.cmp(b.faculty_id)));

        match chosen {
            Some(slot) => {
                slot.load += item.weight;
                plan.placements.push(Placement {
                    submission_id: item.submission_id.clone(),
                    faculty_id: slot.faculty_id.clone(),
                    weight: item.weight,
                });
            }
            None => plan.unassignable.push(item.submission_id.clone()),
        }
    }

    plan
}
