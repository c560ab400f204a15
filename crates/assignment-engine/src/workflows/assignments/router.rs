use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tokio::task::{self, JoinError};
use tracing::error;

use super::audit::{AuditQuery, PageRequest};
use super::coordinator::{AssignmentCoordinator, AssignmentError};
use super::domain::{ActionType, AdminId, AssignmentStatus, FacultyId, SubmissionId};
use super::reports::{AssignmentReports, SubmissionQuery};
use super::store::{Database, StoreError};
use crate::config::ReportConfig;

/// Header carrying the administrator id verified by the upstream gateway.
pub const ADMIN_HEADER: &str = "x-admin-id";

/// Shared state behind every assignment route.
#[derive(Clone)]
pub struct AssignmentServices {
    pub coordinator: Arc<AssignmentCoordinator>,
    pub reports: Arc<AssignmentReports>,
}

impl AssignmentServices {
    pub fn new(db: Database, reports: &ReportConfig) -> Self {
        Self {
            coordinator: Arc::new(AssignmentCoordinator::new(db.clone())),
            reports: Arc::new(AssignmentReports::new(db, reports)),
        }
    }
}

/// Router builder exposing the assignment, faculty, and reporting endpoints.
pub fn assignment_router(services: AssignmentServices) -> Router {
    Router::new()
        .route("/api/v1/assignments/auto", post(auto_assign_handler))
        .route("/api/v1/assignments/manual", post(manual_assign_handler))
        .route("/api/v1/assignments/reassign", post(reassign_handler))
        .route("/api/v1/assignments/redistribute", post(redistribute_handler))
        .route("/api/v1/assignments/bulk", post(bulk_assign_handler))
        .route("/api/v1/assignments/log", get(audit_log_handler))
        .route(
            "/api/v1/assignments/:submission_id/status",
            post(update_status_handler),
        )
        .route(
            "/api/v1/assignments/:submission_id/claim",
            post(claim_handler).delete(release_handler),
        )
        .route(
            "/api/v1/assignments/:submission_id/history",
            get(history_handler),
        )
        .route(
            "/api/v1/faculty/:faculty_id/availability",
            patch(availability_handler),
        )
        .route(
            "/api/v1/faculty/:faculty_id/capacity",
            patch(capacity_handler),
        )
        .route(
            "/api/v1/faculty/loads/recalculate",
            post(recalculate_handler),
        )
        .route("/api/v1/faculty/load", get(load_report_handler))
        .route("/api/v1/submissions/unassigned", get(unassigned_handler))
        .route("/api/v1/submissions", get(submissions_handler))
        .with_state(services)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ManualAssignRequest {
    pub submission_id: SubmissionId,
    pub faculty_id: FacultyId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReassignRequest {
    pub submission_id: SubmissionId,
    pub new_faculty_id: FacultyId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RedistributeRequest {
    pub from_faculty_id: FacultyId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkAssignRequest {
    pub submission_ids: Vec<SubmissionId>,
    pub faculty_id: FacultyId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusRequest {
    pub status: AssignmentStatus,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ClaimRequest {
    /// Defaults to the acting administrator.
    pub holder: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvailabilityRequest {
    pub is_available: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CapacityRequest {
    pub max_capacity: u32,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LoadReportParams {
    #[serde(default)]
    pub available_only: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UnassignedParams {
    pub course: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SubmissionParams {
    pub faculty_id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub unassigned_only: bool,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuditLogParams {
    pub faculty_id: Option<String>,
    pub action_type: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

fn error_body(status: StatusCode, message: impl Into<String>, code: &str) -> Response {
    let payload = json!({
        "error": message.into(),
        "code": code,
    });
    (status, Json(payload)).into_response()
}

fn admin_from(headers: &HeaderMap) -> Result<AdminId, Response> {
    headers
        .get(ADMIN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(AdminId::from)
        .ok_or_else(|| {
            error_body(
                StatusCode::UNAUTHORIZED,
                "missing administrator identity",
                "unauthorized",
            )
        })
}

fn assignment_error(err: AssignmentError) -> Response {
    let status = match &err {
        AssignmentError::NotFound { .. } => StatusCode::NOT_FOUND,
        AssignmentError::InvalidCapacity(_) => StatusCode::BAD_REQUEST,
        AssignmentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AssignmentError::Unavailable(_)
        | AssignmentError::CapacityExceeded { .. }
        | AssignmentError::NoOp { .. }
        | AssignmentError::AlreadyEvaluated(_)
        | AssignmentError::InvalidTransition { .. }
        | AssignmentError::VersionConflict { .. }
        | AssignmentError::NoCapacityAnywhere => StatusCode::CONFLICT,
    };
    let message = match &err {
        AssignmentError::Store(_) => "internal storage error".to_string(),
        other => other.to_string(),
    };
    error_body(status, message, err.code())
}

fn store_error(err: StoreError) -> Response {
    error!(error = %err, "report query failed");
    error_body(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal storage error",
        "storage_error",
    )
}

fn invalid_query(message: String) -> Response {
    error_body(StatusCode::BAD_REQUEST, message, "invalid_query")
}

fn join_error(err: JoinError) -> Response {
    error!(error = %err, "blocking ledger task did not complete");
    error_body(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error",
        "internal_error",
    )
}

/// Runs a coordinator call on the blocking pool so SQLite lock waits never park a
/// runtime worker.
async fn coordinate<T>(
    op: impl FnOnce() -> Result<T, AssignmentError> + Send + 'static,
) -> Result<T, Response>
where
    T: Send + 'static,
{
    match task::spawn_blocking(op).await {
        Ok(result) => result.map_err(assignment_error),
        Err(err) => Err(join_error(err)),
    }
}

async fn report<T>(
    op: impl FnOnce() -> Result<T, StoreError> + Send + 'static,
) -> Result<T, Response>
where
    T: Send + 'static,
{
    match task::spawn_blocking(op).await {
        Ok(result) => result.map_err(store_error),
        Err(err) => Err(join_error(err)),
    }
}

pub(crate) async fn auto_assign_handler(
    State(services): State<AssignmentServices>,
    headers: HeaderMap,
) -> Response {
    let admin = match admin_from(&headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let coordinator = services.coordinator;
    match coordinate(move || coordinator.auto_assign(&admin)).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn manual_assign_handler(
    State(services): State<AssignmentServices>,
    headers: HeaderMap,
    Json(request): Json<ManualAssignRequest>,
) -> Response {
    let admin = match admin_from(&headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let coordinator = services.coordinator;
    let assigned = coordinate(move || {
        coordinator.manual_assign(&admin, &request.submission_id, &request.faculty_id)
    })
    .await;
    match assigned {
        Ok(assignment) => {
            let payload = json!({
                "submission_id": assignment.submission_id,
                "faculty_id": assignment.faculty_id,
                "status": assignment.status,
                "version": assignment.version,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn reassign_handler(
    State(services): State<AssignmentServices>,
    headers: HeaderMap,
    Json(request): Json<ReassignRequest>,
) -> Response {
    let admin = match admin_from(&headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let coordinator = services.coordinator;
    let moved = coordinate(move || {
        coordinator.reassign(&admin, &request.submission_id, &request.new_faculty_id)
    })
    .await;
    match moved {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn redistribute_handler(
    State(services): State<AssignmentServices>,
    headers: HeaderMap,
    Json(request): Json<RedistributeRequest>,
) -> Response {
    let admin = match admin_from(&headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let coordinator = services.coordinator;
    match coordinate(move || coordinator.redistribute(&admin, &request.from_faculty_id)).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn bulk_assign_handler(
    State(services): State<AssignmentServices>,
    headers: HeaderMap,
    Json(request): Json<BulkAssignRequest>,
) -> Response {
    let admin = match admin_from(&headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let coordinator = services.coordinator;
    let placed = coordinate(move || {
        coordinator.bulk_assign(&admin, &request.submission_ids, &request.faculty_id)
    })
    .await;
    match placed {
        Ok(outcome) => {
            let status = if outcome.is_partial() {
                StatusCode::MULTI_STATUS
            } else {
                StatusCode::OK
            };
            let payload = json!({
                "assigned": outcome.assigned.len(),
                "skipped": outcome.errors.len(),
                "assigned_ids": outcome.assigned,
                "errors": outcome.errors,
            });
            (status, Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn update_status_handler(
    State(services): State<AssignmentServices>,
    Path(submission_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<StatusRequest>,
) -> Response {
    let admin = match admin_from(&headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let id = SubmissionId(submission_id);
    let coordinator = services.coordinator;
    match coordinate(move || coordinator.update_status(&admin, &id, request.status)).await {
        Ok(assignment) => (StatusCode::OK, Json(assignment)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn claim_handler(
    State(services): State<AssignmentServices>,
    Path(submission_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ClaimRequest>,
) -> Response {
    let admin = match admin_from(&headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let holder = request
        .holder
        .filter(|holder| !holder.trim().is_empty())
        .unwrap_or_else(|| admin.0.clone());
    let id = SubmissionId(submission_id);
    let coordinator = services.coordinator;
    match coordinate(move || coordinator.claim(&admin, &id, &holder)).await {
        Ok(assignment) => (StatusCode::OK, Json(assignment)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn release_handler(
    State(services): State<AssignmentServices>,
    Path(submission_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let admin = match admin_from(&headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let id = SubmissionId(submission_id);
    let coordinator = services.coordinator;
    match coordinate(move || coordinator.release(&admin, &id)).await {
        Ok(assignment) => (StatusCode::OK, Json(assignment)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn availability_handler(
    State(services): State<AssignmentServices>,
    Path(faculty_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AvailabilityRequest>,
) -> Response {
    let admin = match admin_from(&headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let id = FacultyId(faculty_id);
    let is_available = request.is_available;
    let coordinator = services.coordinator;
    let target = id.clone();
    match coordinate(move || coordinator.set_availability(&admin, &target, is_available)).await {
        Ok(()) => {
            let payload = json!({
                "faculty_id": id,
                "is_available": is_available,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn capacity_handler(
    State(services): State<AssignmentServices>,
    Path(faculty_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CapacityRequest>,
) -> Response {
    let admin = match admin_from(&headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let id = FacultyId(faculty_id);
    let max_capacity = request.max_capacity;
    let coordinator = services.coordinator;
    let target = id.clone();
    match coordinate(move || coordinator.set_capacity(&admin, &target, max_capacity)).await {
        Ok(()) => {
            let payload = json!({
                "faculty_id": id,
                "max_capacity": max_capacity,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn recalculate_handler(
    State(services): State<AssignmentServices>,
    headers: HeaderMap,
) -> Response {
    let admin = match admin_from(&headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let coordinator = services.coordinator;
    match coordinate(move || coordinator.recalculate_loads(&admin)).await {
        Ok(corrections) => {
            let payload = json!({
                "corrected": corrections.len(),
                "corrections": corrections,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn load_report_handler(
    State(services): State<AssignmentServices>,
    headers: HeaderMap,
    Query(params): Query<LoadReportParams>,
) -> Response {
    if let Err(response) = admin_from(&headers) {
        return response;
    }
    let reports = services.reports;
    match report(move || reports.faculty_load(params.available_only)).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn unassigned_handler(
    State(services): State<AssignmentServices>,
    headers: HeaderMap,
    Query(params): Query<UnassignedParams>,
) -> Response {
    if let Err(response) = admin_from(&headers) {
        return response;
    }
    let reports = services.reports;
    match report(move || reports.unassigned_queue(params.course.as_deref(), params.limit)).await {
        Ok(queue) => (StatusCode::OK, Json(queue)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn submissions_handler(
    State(services): State<AssignmentServices>,
    headers: HeaderMap,
    Query(params): Query<SubmissionParams>,
) -> Response {
    if let Err(response) = admin_from(&headers) {
        return response;
    }
    let status = match params.status.as_deref().map(str::parse::<AssignmentStatus>) {
        None => None,
        Some(Ok(status)) => Some(status),
        Some(Err(err)) => return invalid_query(err.to_string()),
    };
    let query = SubmissionQuery {
        faculty_id: params.faculty_id.map(FacultyId),
        status,
        unassigned_only: params.unassigned_only,
        page: PageRequest {
            page: params.page,
            limit: params.limit,
        },
    };
    let reports = services.reports;
    match report(move || reports.submissions(&query)).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn audit_log_handler(
    State(services): State<AssignmentServices>,
    headers: HeaderMap,
    Query(params): Query<AuditLogParams>,
) -> Response {
    if let Err(response) = admin_from(&headers) {
        return response;
    }
    let action_type = match params.action_type.as_deref().map(str::parse::<ActionType>) {
        None => None,
        Some(Ok(action_type)) => Some(action_type),
        Some(Err(err)) => return invalid_query(err.to_string()),
    };
    if let (Some(from), Some(to)) = (params.from_date, params.to_date) {
        if from > to {
            return invalid_query(format!("from_date {from} is after to_date {to}"));
        }
    }
    let query = AuditQuery {
        faculty_id: params.faculty_id.map(FacultyId),
        action_type,
        from_date: params.from_date,
        to_date: params.to_date,
        page: PageRequest {
            page: params.page,
            limit: params.limit,
        },
    };
    let reports = services.reports;
    match report(move || reports.audit_log(&query)).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn history_handler(
    State(services): State<AssignmentServices>,
    Path(submission_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = admin_from(&headers) {
        return response;
    }
    let id = SubmissionId(submission_id);
    let reports = services.reports;
    match report(move || reports.history(&id)).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(response) => response,
    }
}
