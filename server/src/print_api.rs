//! Print submission and job status API
//!
//! The submission adapter: validates incoming batches up front, explodes a
//! batch into one job per label, and returns a per-label success/failure
//! map. Admission of one label never fails the rest of the batch.

use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use labelpress_core::{
    JobId, JobState, Margins, Orientation, PrintError, PrintJob, PrintLabel, PrintMedia,
    PrintRequest, Priority,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Per-label admission deadline; a slow availability lookup lands the label
/// in `failedLabels` without failing the batch.
const ADMISSION_TIMEOUT: Duration = Duration::from_secs(5);

// ===== DTOs =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequestDto {
    pub labels: Vec<LabelDto>,
    #[serde(default)]
    pub metadata: MetadataDto,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetadataDto {
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDto {
    pub printer_name: String,
    /// Base64-encoded HTML document
    pub html_content: String,
    pub print_media: PrintMedia,
    pub margin: MarginDto,
    pub mp_group: Option<String>,
    pub width: String,
    pub height: String,
    pub orientation: Option<Orientation>,
    pub copies: u8,
    pub user_id: Option<i64>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarginDto {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponseDto {
    pub successful_jobs: Vec<String>,
    pub failed_labels: Vec<FailedLabelDto>,
    /// Milliseconds spent handling the submission
    pub processing_time: u64,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedLabelDto {
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub printer_name: String,
    pub error: String,
}

impl FailedLabelDto {
    fn for_label(label: &PrintLabel, error: String) -> Self {
        Self {
            user_id: label.user_id,
            name: label.name.clone(),
            printer_name: label.printer_name.clone(),
            error,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponseDto {
    pub job: JobDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    pub id: String,
    pub state: JobState,
    pub request: RequestSummaryDto,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request echo without the HTML body (which can be large)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummaryDto {
    pub id: String,
    pub priority: Priority,
    pub submitted_at: DateTime<Utc>,
    pub retry_count: u32,
    pub printer_name: String,
    pub print_media: PrintMedia,
    pub width: String,
    pub height: String,
    pub copies: u8,
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub html_bytes: usize,
}

impl From<PrintJob> for JobDto {
    fn from(job: PrintJob) -> Self {
        let request = &job.request;
        let label = &request.label;
        Self {
            id: job.id.to_string(),
            state: job.state,
            request: RequestSummaryDto {
                id: request.id.to_string(),
                priority: request.priority,
                submitted_at: request.submitted_at,
                retry_count: request.retry_count,
                printer_name: label.printer_name.clone(),
                print_media: label.media,
                width: label.width.clone(),
                height: label.height.clone(),
                copies: label.copies,
                user_id: label.user_id,
                name: label.name.clone(),
                html_bytes: label.html.len(),
            },
            start_time: job.started_at,
            end_time: job.finished_at,
            error: job.last_error,
        }
    }
}

// ===== Validation =====

/// Validate the whole batch before any queueing: an invalid batch is
/// rejected atomically with 400.
fn validate_batch(dto: SubmitRequestDto) -> Result<(Vec<PrintLabel>, Priority), ApiError> {
    if dto.labels.is_empty() {
        return Err(ApiError::bad_request(
            "validation error: batch must contain at least one label",
        ));
    }

    let priority = dto.metadata.priority;
    let mut labels = Vec::with_capacity(dto.labels.len());
    for (index, label_dto) in dto.labels.into_iter().enumerate() {
        let label = decode_label(label_dto)
            .map_err(|e| ApiError::bad_request(format!("label {}: {}", index, e)))?;
        labels.push(label);
    }
    Ok((labels, priority))
}

fn decode_label(dto: LabelDto) -> Result<PrintLabel, PrintError> {
    let decoded = BASE64
        .decode(dto.html_content.as_bytes())
        .map_err(|_| PrintError::Validation("htmlContent is not valid base64".into()))?;
    let html = String::from_utf8(decoded)
        .map_err(|_| PrintError::Validation("htmlContent is not valid UTF-8".into()))?;

    let label = PrintLabel {
        printer_name: dto.printer_name,
        html,
        width: dto.width,
        height: dto.height,
        margins: Margins {
            top: dto.margin.top,
            right: dto.margin.right,
            bottom: dto.margin.bottom,
            left: dto.margin.left,
        },
        orientation: dto.orientation,
        copies: dto.copies,
        user_id: dto.user_id,
        name: dto.name,
        media: dto.print_media,
        group: dto.mp_group,
    };
    label.validate()?;
    Ok(label)
}

// ===== Handlers =====

pub async fn submit_handler(
    State(state): State<AppState>,
    Json(dto): Json<SubmitRequestDto>,
) -> Response {
    let started = Instant::now();
    let (labels, priority) = match validate_batch(dto) {
        Ok(validated) => validated,
        Err(e) => return e.into_response(),
    };
    let total = labels.len();

    let mut successful_jobs = Vec::new();
    let mut failed_labels = Vec::new();
    for label in labels {
        match tokio::time::timeout(ADMISSION_TIMEOUT, admit_label(&state, &label, priority)).await
        {
            Ok(Ok(id)) => successful_jobs.push(id.to_string()),
            Ok(Err(e)) => {
                debug!("label for '{}' rejected: {}", label.printer_name, e);
                failed_labels.push(FailedLabelDto::for_label(&label, e.to_string()));
            }
            Err(_) => {
                failed_labels.push(FailedLabelDto::for_label(
                    &label,
                    "admission timed out".to_string(),
                ));
            }
        }
    }

    let status = if failed_labels.is_empty() {
        StatusCode::OK
    } else if successful_jobs.is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::MULTI_STATUS
    };
    info!(
        "submission: {}/{} label(s) admitted in {:?}",
        successful_jobs.len(),
        total,
        started.elapsed()
    );

    let message = format!(
        "{} of {} labels admitted",
        successful_jobs.len(),
        total
    );
    let body = SubmitResponseDto {
        successful_jobs,
        failed_labels,
        processing_time: started.elapsed().as_millis() as u64,
        message,
    };
    (status, Json(body)).into_response()
}

async fn admit_label(
    state: &AppState,
    label: &PrintLabel,
    priority: Priority,
) -> Result<JobId, PrintError> {
    state.printers.check_available(&label.printer_name)?;
    let id = state
        .queue
        .admit(PrintRequest::new(label.clone(), priority))?;
    state.metrics.record_admitted();
    Ok(id)
}

pub async fn job_status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let Ok(id) = job_id.parse::<JobId>() else {
        return ApiError::not_found(format!("job '{}' not found", job_id)).into_response();
    };
    match state.queue.get(id) {
        Some(job) => Json(JobStatusResponseDto { job: job.into() }).into_response(),
        None => ApiError::not_found(format!("job '{}' not found", job_id)).into_response(),
    }
}
