use rusqlite::{params, Connection, OptionalExtension, Row};

use super::balancer::FacultyLoad;
use super::domain::{FacultyAccount, FacultyId};
use super::store::{active_statuses, StoreError};

/// Live load over the ledger: the summed weight of active assignments.
fn live_load_sql() -> String {
    format!(
        "SELECT COALESCE(SUM(submission_weight), 0) FROM assignments \
         WHERE faculty_id = ?1 AND status IN {}",
        active_statuses()
    )
}

/// Data access over faculty accounts. Holds no state beyond the borrowed connection, so
/// it can be created per transaction.
pub struct FacultyRegistry<'c> {
    conn: &'c Connection,
}

impl<'c> FacultyRegistry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Inserts or refreshes an account synced from user management. The cached load is
    /// left alone for existing rows.
    pub fn upsert(&self, account: &FacultyAccount) -> Result<(), StoreError> {
        self.conn.execute(
            r#"INSERT INTO faculty (id, name, max_capacity, is_available, current_load)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   max_capacity = excluded.max_capacity,
                   is_available = excluded.is_available"#,
            params![
                account.id.as_str(),
                account.name,
                account.max_capacity,
                account.is_available,
                account.current_load,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &FacultyId) -> Result<Option<FacultyAccount>, StoreError> {
        let account = self
            .conn
            .query_row(
                "SELECT id, name, max_capacity, is_available, current_load FROM faculty WHERE id = ?1",
                params![id.as_str()],
                map_account,
            )
            .optional()?;
        Ok(account)
    }

    /// Reads the faculty row for update. Only meaningful inside [`super::store::Database::write`],
    /// whose transaction already holds the write lock.
    pub fn lock(&self, id: &FacultyId) -> Result<Option<FacultyAccount>, StoreError> {
        self.get(id)
    }

    /// Locks several faculty rows in id order.
    pub fn lock_many(&self, ids: &[FacultyId]) -> Result<Vec<FacultyAccount>, StoreError> {
        let mut ordered: Vec<&FacultyId> = ids.iter().collect();
        ordered.sort();
        ordered.dedup();

        let mut accounts = Vec::with_capacity(ordered.len());
        for id in ordered {
            if let Some(account) = self.lock(id)? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    pub fn list(&self) -> Result<Vec<FacultyAccount>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, max_capacity, is_available, current_load FROM faculty ORDER BY id",
        )?;
        let accounts = stmt
            .query_map([], map_account)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    /// Available faculty whose live load is below their ceiling, least loaded first with
    /// ties broken by id.
    pub fn list_available_with_capacity(&self) -> Result<Vec<FacultyLoad>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT f.id, f.max_capacity, COALESCE(SUM(a.submission_weight), 0) AS live_load
               FROM faculty f
               LEFT JOIN assignments a
                   ON a.faculty_id = f.id
                  AND a.status IN {active}
               WHERE f.is_available = 1
               GROUP BY f.id, f.max_capacity
               HAVING live_load < f.max_capacity
               ORDER BY live_load ASC, f.id ASC"#,
            active = active_statuses()
        ))?;
        let loads = stmt
            .query_map([], |row| {
                Ok(FacultyLoad {
                    faculty_id: FacultyId(row.get(0)?),
                    max_capacity: row.get(1)?,
                    current_load: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(loads)
    }

    /// Load computed from the ledger. Capacity checks always use this, never the cache.
    pub fn live_load(&self, id: &FacultyId) -> Result<u32, StoreError> {
        let load = self
            .conn
            .query_row(&live_load_sql(), params![id.as_str()], |row| row.get(0))?;
        Ok(load)
    }

    /// Recomputes the live load and writes it to the cache column.
    pub fn refresh_current_load(&self, id: &FacultyId) -> Result<u32, StoreError> {
        let load = self.live_load(id)?;
        self.store_current_load(id, load)?;
        Ok(load)
    }

    pub fn store_current_load(&self, id: &FacultyId, load: u32) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE faculty SET current_load = ?1 WHERE id = ?2",
            params![load, id.as_str()],
        )?;
        Ok(())
    }

    /// Returns `false` when no such faculty exists.
    pub fn set_availability(&self, id: &FacultyId, available: bool) -> Result<bool, StoreError> {
        let rows = self.conn.execute(
            "UPDATE faculty SET is_available = ?1 WHERE id = ?2",
            params![available, id.as_str()],
        )?;
        Ok(rows > 0)
    }

    /// Returns `false` when no such faculty exists. Range validation is the caller's job;
    /// the table CHECK constraint is the backstop.
    pub fn set_capacity(&self, id: &FacultyId, max_capacity: u32) -> Result<bool, StoreError> {
        let rows = self.conn.execute(
            "UPDATE faculty SET max_capacity = ?1 WHERE id = ?2",
            params![max_capacity, id.as_str()],
        )?;
        Ok(rows > 0)
    }
}

fn map_account(row: &Row<'_>) -> rusqlite::Result<FacultyAccount> {
    Ok(FacultyAccount {
        id: FacultyId(row.get(0)?),
        name: row.get(1)?,
        max_capacity: row.get(2)?,
        is_available: row.get(3)?,
        current_load: row.get(4)?,
    })
}
