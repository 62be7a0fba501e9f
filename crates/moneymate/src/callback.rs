//! Reconciliation of OCR worker callbacks into the slip store.
//!
//! The worker reports in its own vocabulary: `success` means the slip is
//! `completed` and `data` holds the extracted fields; any other status
//! marks the slip `failed`. A callback only applies while the slip is
//! still `pending` or `processing`, so duplicate or late reports cannot
//! overwrite a finished result.

use serde::Deserialize;
use thiserror::Error;
use tracing::Instrument;

use crate::error::SlipError;
use crate::slip::{Slip, SlipService, SlipStatus};

/// Worker status that marks a successful OCR run.
pub const WORKER_SUCCESS: &str = "success";

/// Body posted by the OCR worker.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub slip_id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// A callback that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackReport {
    pub slip_id: String,
    pub status: SlipStatus,
    /// Present only for successful reports.
    pub data: Option<serde_json::Value>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CallbackError {
    #[error("Missing slipId or status")]
    MissingField,
}

/// Result of reconciling a report.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// The slip transitioned to the reported state.
    Applied(Slip),
    /// The slip was already terminal; nothing changed.
    Ignored { current: SlipStatus },
}

/// Maps the worker vocabulary onto slip statuses.
pub fn translate_status(worker_status: &str) -> SlipStatus {
    if worker_status == WORKER_SUCCESS {
        SlipStatus::Completed
    } else {
        SlipStatus::Failed
    }
}

impl CallbackPayload {
    /// Checks required fields and translates the status.
    pub fn validate(self) -> Result<CallbackReport, CallbackError> {
        let slip_id = non_blank(self.slip_id).ok_or(CallbackError::MissingField)?;
        let worker_status = non_blank(self.status).ok_or(CallbackError::MissingField)?;

        let status = translate_status(&worker_status);
        let data = match status {
            SlipStatus::Completed => self.data,
            _ => None,
        };

        Ok(CallbackReport {
            slip_id,
            status,
            data,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Applies a validated report if the slip is still in flight.
pub async fn reconcile(
    service: &SlipService,
    report: &CallbackReport,
) -> Result<CallbackOutcome, SlipError> {
    let span = tracing::info_span!(
        "slip.callback",
        slip_id = %report.slip_id,
        status = %report.status,
    );

    async {
        let applied = service.transition(
            &report.slip_id,
            &SlipStatus::NON_TERMINAL,
            report.status,
            report.data.as_ref(),
        )?;

        match applied {
            Some(slip) => {
                log::info!("Slip {} marked {} by OCR worker", slip.id, slip.status);
                Ok(CallbackOutcome::Applied(slip))
            }
            None => {
                let current = service.current_status(&report.slip_id)?;
                log::warn!(
                    "Ignoring {} callback for slip {}: already {}",
                    report.status,
                    report.slip_id,
                    current
                );
                Ok(CallbackOutcome::Ignored { current })
            }
        }
    }
    .instrument(span)
    .await
}
