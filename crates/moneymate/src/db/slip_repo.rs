//! Record operations for the `slips` table.
//!
//! The status UPDATE enforces the record invariants itself: only a
//! `completed` row may carry an `ocr_result`, and `processed_at` is set
//! exactly when the status is terminal.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw slip row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct SlipRow {
    pub id: String,
    pub owner_id: String,
    pub stored_filename: String,
    pub original_filename: String,
    pub status: String,
    /// JSON-encoded OCR payload.
    pub ocr_result: Option<String>,
    pub created_at: String,
    pub processed_at: Option<String>,
}

impl SlipRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            stored_filename: row.get("stored_filename")?,
            original_filename: row.get("original_filename")?,
            status: row.get("status")?,
            ocr_result: row.get("ocr_result")?,
            created_at: row.get("created_at")?,
            processed_at: row.get("processed_at")?,
        })
    }
}

/// A status change for a single slip.
#[derive(Debug, Clone)]
pub struct StatusChange<'a> {
    pub status: &'a str,
    /// New payload. Ignored unless `status` is `completed`; `None` keeps
    /// whatever a completed row already had.
    pub ocr_result: Option<&'a str>,
    /// Timestamp stamped into `processed_at` when `status` is terminal.
    pub now: &'a str,
    /// When set, the row is only touched if its current status is one of these.
    pub only_if_status: Option<&'a [&'a str]>,
}

/// Inserts a new slip row.
pub fn insert(db: &Database, slip: &SlipRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO slips (id, owner_id, stored_filename, original_filename, status,
             ocr_result, created_at, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                slip.id,
                slip.owner_id,
                slip.stored_filename,
                slip.original_filename,
                slip.status,
                slip.ocr_result,
                slip.created_at,
                slip.processed_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a slip by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<SlipRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM slips WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], SlipRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists all slips of one owner, newest first.
pub fn list_by_owner(db: &Database, owner_id: &str) -> Result<Vec<SlipRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM slips WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map(params![owner_id], SlipRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Applies a status change. Returns `true` if a row was modified, `false`
/// if the id is unknown or the `only_if_status` condition did not hold.
pub fn update_status(
    db: &Database,
    id: &str,
    change: &StatusChange<'_>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
            Box::new(id.to_string()),
            Box::new(change.status.to_string()),
            Box::new(change.ocr_result.map(str::to_string)),
            Box::new(change.now.to_string()),
        ];

        let mut sql = String::from(
            "UPDATE slips SET
               status = ?2,
               ocr_result = CASE WHEN ?2 = 'completed' THEN COALESCE(?3, ocr_result) ELSE NULL END,
               processed_at = CASE WHEN ?2 IN ('completed', 'failed') THEN ?4 ELSE NULL END
             WHERE id = ?1",
        );

        if let Some(allowed) = change.only_if_status {
            if allowed.is_empty() {
                return Ok(false);
            }
            let placeholders: Vec<String> = allowed
                .iter()
                .map(|status| {
                    param_values.push(Box::new(status.to_string()));
                    format!("?{}", param_values.len())
                })
                .collect();
            sql.push_str(&format!(" AND status IN ({})", placeholders.join(", ")));
        }

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, params_ref.as_slice())?;
        Ok(changed > 0)
    })
}

/// Moves a slip back to `pending`, clearing `ocr_result` and `processed_at`,
/// but only if its current status is one of `from`.
pub fn reset_to_pending(
    db: &Database,
    id: &str,
    from: &[&str],
    now: &str,
) -> Result<bool, DatabaseError> {
    update_status(
        db,
        id,
        &StatusChange {
            status: "pending",
            ocr_result: None,
            now,
            only_if_status: Some(from),
        },
    )
}

/// Counts slips with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM slips WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
