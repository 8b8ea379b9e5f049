//! Printer status and Zebra control API

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use labelpress_core::{PrinterRecord, PrinterStatus};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterDto {
    pub name: String,
    pub status: PrinterStatus,
    pub driver: Option<String>,
    pub port: Option<String>,
    pub active_jobs: u32,
    pub consecutive_failures: u32,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
}

impl From<PrinterRecord> for PrinterDto {
    fn from(record: PrinterRecord) -> Self {
        Self {
            name: record.name.clone(),
            status: record.effective_status(),
            driver: record.driver,
            port: record.port,
            active_jobs: record.active_jobs,
            consecutive_failures: record.consecutive_failures,
            last_completed_at: record.last_completed_at,
            checked_at: record.checked_at,
        }
    }
}

pub async fn printers_handler(State(state): State<AppState>) -> Response {
    let records = state.printers.list();

    // Degrade to an empty list with a warning rather than hanging the
    // request on a wedged enumeration.
    if records.is_empty() && !state.printers.discovery_ok() {
        return Json(json!({
            "printers": [],
            "warning": "discovery timed out",
        }))
        .into_response();
    }

    let online = records
        .iter()
        .filter(|r| r.status == PrinterStatus::Online)
        .count();
    let printers: Vec<PrinterDto> = records.into_iter().map(PrinterDto::from).collect();
    Json(json!({
        "printers": printers,
        "totalPrinters": printers.len(),
        "onlinePrinters": online,
    }))
    .into_response()
}

pub async fn zebra_reset_handler(
    State(state): State<AppState>,
    Path(printer_name): Path<String>,
) -> Response {
    let Some(record) = state.printers.get(&printer_name) else {
        return ApiError::not_found(format!("printer '{}' not found", printer_name))
            .into_response();
    };
    if record.status != PrinterStatus::Online {
        return ApiError::bad_request(format!(
            "printer '{}' is {}",
            printer_name,
            record.status
        ))
        .into_response();
    }

    match state.zebra.reset_media(&printer_name).await {
        Ok(()) => Json(json!({
            "success": true,
            "printer": printer_name,
        }))
        .into_response(),
        Err(e) => {
            error!("media reset for '{}' failed: {}", printer_name, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
