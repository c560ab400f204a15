use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;

use super::domain::{ActionType, AdminId, AssignmentLogEntry, FacultyId, SubmissionId};
use super::store::{decode_label, decode_timestamp, encode_timestamp, StoreError};

const LOG_COLUMNS: &str = "id, submission_id, action_type, from_faculty_id, to_faculty_id, \
     admin_id, notes, created_at";

const DEFAULT_PAGE_SIZE: u32 = 20;

/// Entry about to be appended; the id and timestamp are assigned on write.
#[derive(Debug, Clone)]
pub struct LogDraft<'a> {
    pub submission_id: &'a SubmissionId,
    pub action_type: ActionType,
    pub from_faculty_id: Option<&'a FacultyId>,
    pub to_faculty_id: Option<&'a FacultyId>,
    pub admin_id: Option<&'a AdminId>,
    pub notes: String,
}

/// Filters accepted by the audit log view.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub faculty_id: Option<FacultyId>,
    pub action_type: Option<ActionType>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub page: PageRequest,
}

/// 1-based page selection shared by the paginated views.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    /// Clamps to `page >= 1` and `1 <= limit <= max_limit`.
    pub fn normalize(self, max_limit: u32) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, max_limit.max(1));
        (page, limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(u64::from(limit));
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }

    pub(crate) fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

/// Append-only provenance trail. Rows are never updated or deleted; the schema enforces
/// this with triggers.
pub struct AuditLog<'c> {
    conn: &'c Connection,
}

impl<'c> AuditLog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Appends one entry. Must run in the same transaction as the mutation it documents.
    pub fn record(&self, draft: LogDraft<'_>, at: DateTime<Utc>) -> Result<i64, StoreError> {
        self.conn.execute(
            r#"INSERT INTO assignment_log (
                   submission_id, action_type, from_faculty_id, to_faculty_id,
                   admin_id, notes, created_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                draft.submission_id.as_str(),
                draft.action_type.as_str(),
                draft.from_faculty_id.map(FacultyId::as_str),
                draft.to_faculty_id.map(FacultyId::as_str),
                draft.admin_id.map(AdminId::as_str),
                draft.notes,
                encode_timestamp(&at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Filtered page of entries, newest first. A faculty filter matches either side of a
    /// move; the date range is inclusive on both calendar days.
    pub fn query(
        &self,
        query: &AuditQuery,
        max_page_size: u32,
    ) -> Result<Page<AssignmentLogEntry>, StoreError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(faculty_id) = &query.faculty_id {
            clauses.push("(from_faculty_id = ? OR to_faculty_id = ?)");
            values.push(faculty_id.0.clone().into());
            values.push(faculty_id.0.clone().into());
        }
        if let Some(action_type) = query.action_type {
            clauses.push("action_type = ?");
            values.push(action_type.as_str().to_string().into());
        }
        if let Some(from_date) = query.from_date {
            clauses.push("created_at >= ?");
            values.push(encode_timestamp(&start_of_day(from_date)).into());
        }
        if let Some(to_date) = query.to_date {
            clauses.push("created_at < ?");
            values.push(encode_timestamp(&(start_of_day(to_date) + Duration::days(1))).into());
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM assignment_log{filter}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let (page, limit) = query.page.normalize(max_page_size);
        let pagination = Pagination::new(page, limit, total.max(0) as u64);

        let mut paged = values.clone();
        paged.push(i64::from(limit).into());
        paged.push(pagination.offset().into());
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM assignment_log{filter} \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))?;
        let data = stmt
            .query_map(params_from_iter(paged.iter()), map_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page { data, pagination })
    }

    /// Full trail of one submission, oldest first.
    pub fn history(&self, submission_id: &SubmissionId) -> Result<Vec<AssignmentLogEntry>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM assignment_log WHERE submission_id = ?1 \
             ORDER BY created_at ASC, id ASC"
        ))?;
        let entries = stmt
            .query_map(params![submission_id.as_str()], map_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM assignment_log", [], |row| row.get(0))?;
        Ok(total.max(0) as u64)
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn map_entry(row: &Row<'_>) -> rusqlite::Result<AssignmentLogEntry> {
    Ok(AssignmentLogEntry {
        id: row.get(0)?,
        submission_id: SubmissionId(row.get(1)?),
        action_type: decode_label(2, row.get(2)?)?,
        from_faculty_id: row.get::<_, Option<String>>(3)?.map(FacultyId),
        to_faculty_id: row.get::<_, Option<String>>(4)?.map(FacultyId),
        admin_id: row.get::<_, Option<String>>(5)?.map(AdminId),
        notes: row.get(6)?,
        created_at: decode_timestamp(7, row.get(7)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::assignments::store::Database;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, day, hour, 0, 0).unwrap()
    }

    fn seed(db: &Database) {
        let admin = AdminId::from("admin-1");
        let f1 = FacultyId::from("f1");
        let f2 = FacultyId::from("f2");
        db.write(|tx| {
            let log = AuditLog::new(tx);
            let s1 = SubmissionId::from("s1");
            let s2 = SubmissionId::from("s2");
            log.record(
                LogDraft {
                    submission_id: &s1,
                    action_type: ActionType::AutoAssign,
                    from_faculty_id: None,
                    to_faculty_id: Some(&f1),
                    admin_id: Some(&admin),
                    notes: String::new(),
                },
                at(1, 9),
            )?;
            log.record(
                LogDraft {
                    submission_id: &s1,
                    action_type: ActionType::Reassign,
                    from_faculty_id: Some(&f1),
                    to_faculty_id: Some(&f2),
                    admin_id: Some(&admin),
                    notes: "rebalanced".to_string(),
                },
                at(2, 23),
            )?;
            log.record(
                LogDraft {
                    submission_id: &s2,
                    action_type: ActionType::AutoAssign,
                    from_faculty_id: None,
                    to_faculty_id: Some(&f2),
                    admin_id: None,
                    notes: String::new(),
                },
                at(3, 0),
            )?;
            Ok::<_, StoreError>(())
        })
        .expect("seed");
    }

    #[test]
    fn faculty_filter_matches_either_side() {
        let db = Database::open_in_memory().expect("db");
        seed(&db);
        let page = db
            .read(|conn| {
                AuditLog::new(conn).query(
                    &AuditQuery {
                        faculty_id: Some(FacultyId::from("f1")),
                        ..AuditQuery::default()
                    },
                    100,
                )
            })
            .expect("query");
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.data[0].action_type, ActionType::Reassign);
    }

    #[test]
    fn date_range_includes_whole_end_day() {
        let db = Database::open_in_memory().expect("db");
        seed(&db);
        let page = db
            .read(|conn| {
                AuditLog::new(conn).query(
                    &AuditQuery {
                        from_date: NaiveDate::from_ymd_opt(2026, 4, 2),
                        to_date: NaiveDate::from_ymd_opt(2026, 4, 2),
                        ..AuditQuery::default()
                    },
                    100,
                )
            })
            .expect("query");
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.data[0].notes, "rebalanced");
    }

    #[test]
    fn pages_are_clamped_to_the_configured_maximum() {
        let db = Database::open_in_memory().expect("db");
        seed(&db);
        let page = db
            .read(|conn| {
                AuditLog::new(conn).query(
                    &AuditQuery {
                        action_type: Some(ActionType::AutoAssign),
                        page: PageRequest::new(2, 50),
                        ..AuditQuery::default()
                    },
                    1,
                )
            })
            .expect("query");
        assert_eq!(page.pagination.limit, 1);
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].submission_id, SubmissionId::from("s1"));
    }

    #[test]
    fn history_is_chronological() {
        let db = Database::open_in_memory().expect("db");
        seed(&db);
        let history = db
            .read(|conn| AuditLog::new(conn).history(&SubmissionId::from("s1")))
            .expect("history");
        let actions: Vec<ActionType> = history.iter().map(|entry| entry.action_type).collect();
        assert_eq!(actions, vec![ActionType::AutoAssign, ActionType::Reassign]);
    }
}
