use std::collections::BTreeMap;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::domain::{Assignment, AssignmentStatus, FacultyId, Submission, SubmissionId};
use super::store::{
    assignable_submission_statuses, decode_label, decode_optional_timestamp, decode_timestamp,
    encode_timestamp, status_list, StoreError,
};

const ASSIGNMENT_COLUMNS: &str = "a.submission_id, a.faculty_id, a.status, a.assigned_at, \
     a.version, a.locked_by, a.locked_at, a.reallocation_count, a.submission_weight";

const SUBMISSION_COLUMNS: &str = "s.id, s.candidate, s.course, s.level, s.submitted_at, s.status, s.weight";

/// The submission→faculty binding table.
pub struct AssignmentLedger<'c> {
    conn: &'c Connection,
}

impl<'c> AssignmentLedger<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn find(&self, submission_id: &SubmissionId) -> Result<Option<Assignment>, StoreError> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments a WHERE a.submission_id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![submission_id.as_str()], map_assignment)
            .optional()?;
        Ok(row)
    }

    /// Reads the given rows for update in submission-id order, skipping ids without an
    /// assignment. Callers lock faculty rows before calling this.
    pub fn lock_rows(
        &self,
        submission_ids: &[SubmissionId],
    ) -> Result<BTreeMap<SubmissionId, Assignment>, StoreError> {
        let mut ordered: Vec<&SubmissionId> = submission_ids.iter().collect();
        ordered.sort();
        ordered.dedup();

        let mut rows = BTreeMap::new();
        for id in ordered {
            if let Some(row) = self.find(id)? {
                rows.insert(id.clone(), row);
            }
        }
        Ok(rows)
    }

    /// Not-yet-started work held by `faculty_id`, oldest submission first.
    pub fn unstarted_for_faculty(&self, faculty_id: &FacultyId) -> Result<Vec<Assignment>, StoreError> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments a \
             JOIN submissions s ON s.id = a.submission_id \
             WHERE a.faculty_id = ?1 AND a.status IN {unstarted} \
             ORDER BY s.submitted_at ASC, a.submission_id ASC",
            unstarted = status_list(&AssignmentStatus::UNSTARTED)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![faculty_id.as_str()], map_assignment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Inserts a fresh row. Returns `false` when the submission already has one, which the
    /// coordinator treats as a lost race.
    pub fn insert(&self, row: &Assignment) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            r#"INSERT INTO assignments (
                   submission_id, faculty_id, status, assigned_at, version,
                   locked_by, locked_at, reallocation_count, submission_weight
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
               ON CONFLICT(submission_id) DO NOTHING"#,
            params![
                row.submission_id.as_str(),
                row.faculty_id.as_str(),
                row.status.as_str(),
                encode_timestamp(&row.assigned_at),
                row.version,
                row.locked_by,
                row.locked_at.as_ref().map(encode_timestamp),
                row.reallocation_count,
                row.submission_weight,
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Writes `next` if the stored version still equals `next.version`, bumping it by one.
    /// Returns the stored row on success and `None` when the version moved.
    pub fn update(&self, next: &Assignment) -> Result<Option<Assignment>, StoreError> {
        let updated = self.conn.execute(
            r#"UPDATE assignments
               SET faculty_id = ?1, status = ?2, assigned_at = ?3, locked_by = ?4,
                   locked_at = ?5, reallocation_count = ?6, submission_weight = ?7,
                   version = version + 1
               WHERE submission_id = ?8 AND version = ?9"#,
            params![
                next.faculty_id.as_str(),
                next.status.as_str(),
                encode_timestamp(&next.assigned_at),
                next.locked_by,
                next.locked_at.as_ref().map(encode_timestamp),
                next.reallocation_count,
                next.submission_weight,
                next.submission_id.as_str(),
                next.version,
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        Ok(Some(Assignment {
            version: next.version + 1,
            ..next.clone()
        }))
    }
}

/// Read/write access to the submission records synced from the grading subsystem.
pub struct SubmissionCatalog<'c> {
    conn: &'c Connection,
}

impl<'c> SubmissionCatalog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, submission: &Submission) -> Result<(), StoreError> {
        self.conn.execute(
            r#"INSERT INTO submissions (id, candidate, course, level, submitted_at, status, weight)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(id) DO UPDATE SET
                   candidate = excluded.candidate,
                   course = excluded.course,
                   level = excluded.level,
                   submitted_at = excluded.submitted_at,
                   status = excluded.status,
                   weight = excluded.weight"#,
            params![
                submission.id.as_str(),
                submission.candidate,
                submission.course,
                submission.level,
                encode_timestamp(&submission.submitted_at),
                submission.status,
                submission.weight,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions s WHERE s.id = ?1");
        let submission = self
            .conn
            .query_row(&sql, params![id.as_str()], map_submission)
            .optional()?;
        Ok(submission)
    }

    /// Assignable submissions with no ledger row, oldest first.
    pub fn unassigned(
        &self,
        course: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Submission>, StoreError> {
        let mut sql = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions s \
             LEFT JOIN assignments a ON a.submission_id = s.id \
             WHERE a.submission_id IS NULL AND s.status IN {assignable}",
            assignable = assignable_submission_statuses()
        );
        let mut values: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(course) = course {
            sql.push_str(" AND s.course = ?");
            values.push(course.to_string().into());
        }
        sql.push_str(" ORDER BY s.submitted_at ASC, s.id ASC");
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            values.push(i64::from(limit).into());
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), map_submission)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

pub(crate) fn map_assignment(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        submission_id: SubmissionId(row.get(0)?),
        faculty_id: FacultyId(row.get(1)?),
        status: decode_label(2, row.get(2)?)?,
        assigned_at: decode_timestamp(3, row.get(3)?)?,
        version: row.get(4)?,
        locked_by: row.get(5)?,
        locked_at: decode_optional_timestamp(6, row.get(6)?)?,
        reallocation_count: row.get(7)?,
        submission_weight: row.get(8)?,
    })
}

pub(crate) fn map_submission(row: &Row<'_>) -> rusqlite::Result<Submission> {
    Ok(Submission {
        id: SubmissionId(row.get(0)?),
        candidate: row.get(1)?,
        course: row.get(2)?,
        level: row.get(3)?,
        submitted_at: decode_timestamp(4, row.get(4)?)?,
        status: row.get(5)?,
        weight: row.get(6)?,
    })
}
