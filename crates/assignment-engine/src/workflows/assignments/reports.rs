//! Read-only views over the ledger for dashboards and grading screens.
//!
//! These bypass [`super::AssignmentCoordinator`] and take no write lock, so a view can be
//! stale by the time it is rendered.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;

use super::audit::{AuditLog, AuditQuery, Page, PageRequest, Pagination};
use super::domain::{AssignmentLogEntry, AssignmentStatus, FacultyId, Submission, SubmissionId};
use super::ledger::SubmissionCatalog;
use super::store::{
    active_statuses, decode_label, decode_optional_timestamp, decode_timestamp, Database, StoreError,
};
use crate::config::ReportConfig;

/// Per-reviewer workload line of the load report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacultyLoadEntry {
    pub id: FacultyId,
    pub name: String,
    pub pending: u32,
    pub completed: u32,
    pub total: u32,
    pub current_load: u32,
    pub live_load: u32,
    pub max_capacity: u32,
    pub is_available: bool,
    pub courses: Vec<String>,
}

/// Filters for the submissions-with-assignment listing.
#[derive(Debug, Clone, Default)]
pub struct SubmissionQuery {
    pub faculty_id: Option<FacultyId>,
    pub status: Option<AssignmentStatus>,
    pub unassigned_only: bool,
    pub page: PageRequest,
}

/// A submission joined with its assignment; the assignment fields are `None` while it
/// waits in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionAssignmentView {
    pub id: SubmissionId,
    pub candidate: String,
    pub course: String,
    pub level: String,
    pub submitted_at: DateTime<Utc>,
    pub submission_status: String,
    pub faculty_id: Option<FacultyId>,
    pub faculty_name: Option<String>,
    pub assignment_status: Option<AssignmentStatus>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub version: Option<u32>,
    pub locked_by: Option<String>,
    pub reallocation_count: Option<u32>,
}

#[derive(Clone)]
pub struct AssignmentReports {
    db: Database,
    max_page_size: u32,
}

impl AssignmentReports {
    pub fn new(db: Database, config: &ReportConfig) -> Self {
        Self {
            db,
            max_page_size: config.max_page_size,
        }
    }

    pub fn faculty_load(&self, available_only: bool) -> Result<Vec<FacultyLoadEntry>, StoreError> {
        self.db.read(|conn| {
            let filter = if available_only {
                "WHERE f.is_available = 1"
            } else {
                ""
            };
            let mut stmt = conn.prepare(&format!(
                r#"SELECT f.id, f.name, f.max_capacity, f.is_available, f.current_load,
                       COALESCE(SUM(CASE WHEN a.status IN {active}
                                         THEN 1 ELSE 0 END), 0),
                       COALESCE(SUM(CASE WHEN a.status = '{evaluated}' THEN 1 ELSE 0 END), 0),
                       COUNT(a.submission_id),
                       COALESCE(SUM(CASE WHEN a.status IN {active}
                                         THEN a.submission_weight ELSE 0 END), 0)
                   FROM faculty f
                   LEFT JOIN assignments a ON a.faculty_id = f.id
                   {filter}
                   GROUP BY f.id
                   ORDER BY f.id"#,
                active = active_statuses(),
                evaluated = AssignmentStatus::Evaluated.as_str(),
            ))?;
            let mut entries = stmt
                .query_map([], |row| {
                    Ok(FacultyLoadEntry {
                        id: FacultyId(row.get(0)?),
                        name: row.get(1)?,
                        max_capacity: row.get(2)?,
                        is_available: row.get(3)?,
                        current_load: row.get(4)?,
                        pending: row.get(5)?,
                        completed: row.get(6)?,
                        total: row.get(7)?,
                        live_load: row.get(8)?,
                        courses: Vec::new(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            for entry in &mut entries {
                entry.courses = courses_for(conn, &entry.id)?;
            }
            Ok(entries)
        })
    }

    pub fn unassigned_queue(
        &self,
        course: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Submission>, StoreError> {
        self.db
            .read(|conn| SubmissionCatalog::new(conn).unassigned(course, limit))
    }

    pub fn submissions(
        &self,
        query: &SubmissionQuery,
    ) -> Result<Page<SubmissionAssignmentView>, StoreError> {
        self.db.read(|conn| {
            let mut clauses: Vec<&str> = Vec::new();
            let mut values: Vec<rusqlite::types::Value> = Vec::new();
            if query.unassigned_only {
                clauses.push("a.submission_id IS NULL");
            }
            if let Some(faculty_id) = &query.faculty_id {
                clauses.push("a.faculty_id = ?");
                values.push(faculty_id.0.clone().into());
            }
            if let Some(status) = query.status {
                clauses.push("a.status = ?");
                values.push(status.as_str().to_string().into());
            }
            let filter = if clauses.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", clauses.join(" AND "))
            };
            let joins = "FROM submissions s \
                 LEFT JOIN assignments a ON a.submission_id = s.id \
                 LEFT JOIN faculty f ON f.id = a.faculty_id";

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) {joins}{filter}"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;
            let (page, limit) = query.page.normalize(self.max_page_size);
            let pagination = Pagination::new(page, limit, total.max(0) as u64);

            values.push(i64::from(limit).into());
            values.push(pagination.offset().into());
            let mut stmt = conn.prepare(&format!(
                "SELECT s.id, s.candidate, s.course, s.level, s.submitted_at, s.status, \
                        a.faculty_id, f.name, a.status, a.assigned_at, a.version, a.locked_by, \
                        a.reallocation_count \
                 {joins}{filter} \
                 ORDER BY s.submitted_at ASC, s.id ASC LIMIT ? OFFSET ?"
            ))?;
            let data = stmt
                .query_map(params_from_iter(values.iter()), map_view)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Page { data, pagination })
        })
    }

    pub fn audit_log(&self, query: &AuditQuery) -> Result<Page<AssignmentLogEntry>, StoreError> {
        self.db
            .read(|conn| AuditLog::new(conn).query(query, self.max_page_size))
    }

    pub fn history(&self, submission_id: &SubmissionId) -> Result<Vec<AssignmentLogEntry>, StoreError> {
        self.db.read(|conn| AuditLog::new(conn).history(submission_id))
    }
}

fn courses_for(conn: &Connection, faculty_id: &FacultyId) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.course FROM assignments a \
         JOIN submissions s ON s.id = a.submission_id \
         WHERE a.faculty_id = ?1 ORDER BY s.course",
    )?;
    let courses = stmt
        .query_map(params![faculty_id.as_str()], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(courses)
}

fn map_view(row: &Row<'_>) -> rusqlite::Result<SubmissionAssignmentView> {
    Ok(SubmissionAssignmentView {
        id: SubmissionId(row.get(0)?),
        candidate: row.get(1)?,
        course: row.get(2)?,
        level: row.get(3)?,
        submitted_at: decode_timestamp(4, row.get(4)?)?,
        submission_status: row.get(5)?,
        faculty_id: row.get::<_, Option<String>>(6)?.map(FacultyId),
        faculty_name: row.get(7)?,
        assignment_status: row
            .get::<_, Option<String>>(8)?
            .map(|raw| decode_label(8, raw))
            .transpose()?,
        assigned_at: decode_optional_timestamp(9, row.get(9)?)?,
        version: row.get(10)?,
        locked_by: row.get(11)?,
        reallocation_count: row.get(12)?,
    })
}
