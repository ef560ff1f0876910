//! Bridge protocol under `/api/fiscal-bridge`. All routes sit behind the
//! bridge bearer middleware, so `BridgeContext` is always present.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use fiscalbridge_core::JobId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::BridgeContext;

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/poll", get(poll))
        .route("/heartbeat", post(heartbeat))
        .route("/complete/:job_id", post(complete))
        .route("/complete-shift/:job_id", post(complete_shift))
        .route("/fail/:job_id", post(fail))
        .route("/shift-status-request", get(shift_status_request))
        .route("/push-status", post(push_status))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(bridge): Extension<BridgeContext>,
    body: Bytes,
) -> axum::response::Response {
    let request: dto::HeartbeatRequest = match dto::optional_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.dispatch().register(bridge.token(), &request.into()).await {
        Ok(registration) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "account_id": registration.account_id.to_string(),
                "bridge_id": registration.bridge_id.to_string(),
                "bridge_name": registration.bridge_name,
                "poll_interval_ms": registration.poll_interval_ms,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn poll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(bridge): Extension<BridgeContext>,
) -> axum::response::Response {
    match services.dispatch().poll(bridge.account_id()).await {
        Ok(jobs) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "jobs": jobs.iter().map(dto::polled_job_to_json).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn heartbeat(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(bridge): Extension<BridgeContext>,
    body: Bytes,
) -> axum::response::Response {
    let request: dto::HeartbeatRequest = match dto::optional_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.dispatch().heartbeat(bridge.token(), &request.into()).await {
        Ok(at) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "timestamp": at.to_rfc3339() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn complete(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(bridge): Extension<BridgeContext>,
    Path(job_id): Path<String>,
    body: Result<Json<dto::CompleteRequest>, JsonRejection>,
) -> axum::response::Response {
    let job_id: JobId = match errors::parse_id("job_id", &job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };

    match services
        .dispatch()
        .complete(bridge.account_id(), job_id, body.into())
        .await
    {
        Ok(job) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": "Job marked as completed",
                "job_id": job.id.to_string(),
                "status": job.status.as_str(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn complete_shift(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(bridge): Extension<BridgeContext>,
    Path(job_id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let job_id: JobId = match errors::parse_id("job_id", &job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let request: dto::CompleteShiftRequest = match dto::optional_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services
        .dispatch()
        .complete_shift_operation(bridge.account_id(), job_id, request.into_response_payload())
        .await
    {
        Ok(job) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": "Shift operation completed",
                "job_id": job.id.to_string(),
                "operation_type": job.operation_type.as_str(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn fail(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(bridge): Extension<BridgeContext>,
    Path(job_id): Path<String>,
    body: Result<Json<dto::FailRequest>, JsonRejection>,
) -> axum::response::Response {
    let job_id: JobId = match errors::parse_id("job_id", &job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };

    match services
        .dispatch()
        .fail(bridge.account_id(), job_id, body.into())
        .await
    {
        Ok((job, outcome)) => {
            let message = if outcome.can_retry {
                "Job failed; retry scheduled"
            } else {
                "Job failed permanently"
            };
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "message": message,
                    "status": job.status.as_str(),
                    "can_retry": outcome.can_retry,
                    "is_retriable": outcome.is_retriable,
                    "retry_count": outcome.retry_count,
                    "next_retry_at": outcome.next_retry_at.map(|t| t.to_rfc3339()),
                })),
            )
                .into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn shift_status_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(bridge): Extension<BridgeContext>,
) -> axum::response::Response {
    match services.dispatch().shift_status_request(bridge.account_id()).await {
        Ok(request_data) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "request_data": request_data })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn push_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(bridge): Extension<BridgeContext>,
    body: Result<Json<dto::PushStatusRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };

    match services
        .dispatch()
        .push_status(bridge.account_id(), body.into())
        .await
    {
        Ok(status) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": "Shift status updated",
                "shift_open": status.shift_open,
                "shift_opened_at": status.shift_opened_at.map(|t| t.to_rfc3339()),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
