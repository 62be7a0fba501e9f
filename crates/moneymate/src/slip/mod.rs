//! Slip records and their processing lifecycle.
//!
//! A slip moves `pending` → (`processing`) → `completed` | `failed`.
//! `pending` and `failed` slips may be re-queued back to `pending`.

pub mod service;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::db::slip_repo::SlipRow;
use crate::db::DatabaseError;

pub use service::{SlipResult, SlipService, UploadedSlip};

/// Lifecycle state of a slip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SlipStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SlipStatus {
    pub const NON_TERMINAL: [SlipStatus; 2] = [SlipStatus::Pending, SlipStatus::Processing];
    pub const REQUEUEABLE: [SlipStatus; 2] = [SlipStatus::Pending, SlipStatus::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlipStatus::Pending => "pending",
            SlipStatus::Processing => "processing",
            SlipStatus::Completed => "completed",
            SlipStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SlipStatus::Completed | SlipStatus::Failed)
    }

    pub fn is_requeueable(&self) -> bool {
        Self::REQUEUEABLE.contains(self)
    }
}

impl fmt::Display for SlipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SlipStatus::Pending),
            "processing" => Ok(SlipStatus::Processing),
            "completed" => Ok(SlipStatus::Completed),
            "failed" => Ok(SlipStatus::Failed),
            other => Err(format!("unknown slip status '{}'", other)),
        }
    }
}

/// An uploaded slip image and the state of its OCR processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Slip {
    pub id: String,
    /// Server-generated name of the stored image.
    #[serde(rename = "filename")]
    pub stored_filename: String,
    /// Client-supplied name, for display only.
    #[serde(rename = "originalName")]
    pub original_filename: String,
    pub status: SlipStatus,
    pub ocr_result: Option<serde_json::Value>,
    #[serde(rename = "userId")]
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Slip {
    /// Decodes a stored row.
    pub fn from_row(row: SlipRow) -> Result<Self, DatabaseError> {
        let invalid = |reason: String| DatabaseError::InvalidRow {
            id: row.id.clone(),
            reason,
        };

        let status = SlipStatus::from_str(&row.status).map_err(invalid)?;
        let ocr_result = match row.ocr_result.as_deref() {
            Some(raw) => Some(
                serde_json::from_str(raw)
                    .map_err(|e| invalid(format!("ocr_result is not JSON: {}", e)))?,
            ),
            None => None,
        };
        let created_at = parse_timestamp(&row.created_at).map_err(invalid)?;
        let processed_at = match row.processed_at.as_deref() {
            Some(raw) => Some(parse_timestamp(raw).map_err(invalid)?),
            None => None,
        };

        Ok(Self {
            id: row.id,
            stored_filename: row.stored_filename,
            original_filename: row.original_filename,
            status,
            ocr_result,
            owner_id: row.owner_id,
            created_at,
            processed_at,
        })
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", s, e))
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}
