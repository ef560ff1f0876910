//! Collaborator API under `/internal`: job creation and views, shift requests,
//! printer configuration and bridge provisioning.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use fiscalbridge_core::{AccountId, BridgeId, JobId};
use fiscalbridge_fiscal::{NewFiscalJob, OperationType};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/accounts/:account_id/jobs", post(enqueue_job).get(list_jobs))
        .route("/accounts/:account_id/jobs/stats", get(job_stats))
        .route("/accounts/:account_id/jobs/:job_id", get(get_job))
        .route("/accounts/:account_id/shift/:operation", post(request_shift_operation))
        .route("/accounts/:account_id/shift-status", get(shift_status))
        .route("/accounts/:account_id/printer-config", put(upsert_printer_config))
        .route("/accounts/:account_id/bridges", post(provision_bridge).get(list_bridges))
        .route("/accounts/:account_id/bridges/:bridge_id/revoke", post(revoke_bridge))
}

pub async fn enqueue_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_id): Path<String>,
    body: Result<Json<NewFiscalJob>, JsonRejection>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_id("account_id", &account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(request) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };

    match services.dispatch().enqueue(account_id, request).await {
        Ok(job) => (StatusCode::CREATED, Json(dto::job_to_json(&job))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_id): Path<String>,
    Query(query): Query<dto::ListJobsQuery>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_id("account_id", &account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let status = match query.status() {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services
        .dispatch()
        .list_jobs(account_id, status, query.limit)
        .await
    {
        Ok(jobs) => {
            let items = jobs.iter().map(dto::job_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn job_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_id): Path<String>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_id("account_id", &account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.dispatch().job_stats(account_id).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "pending": stats.pending,
                "processing": stats.processing,
                "completed": stats.completed,
                "failed": stats.failed,
                "total": stats.total(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path((account_id, job_id)): Path<(String, String)>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_id("account_id", &account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let job_id: JobId = match errors::parse_id("job_id", &job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.dispatch().job_status(account_id, job_id).await {
        Ok(job) => (StatusCode::OK, Json(dto::job_to_json(&job))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn request_shift_operation(
    Extension(services): Extension<Arc<AppServices>>,
    Path((account_id, operation)): Path<(String, String)>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_id("account_id", &account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let operation = match operation.as_str() {
        "open" => OperationType::ShiftOpen,
        "close" => OperationType::ShiftClose,
        "status" => OperationType::ShiftStatus,
        _ => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "unknown shift operation"),
    };

    match services
        .dispatch()
        .request_shift_operation(account_id, operation)
        .await
    {
        Ok(job) => (StatusCode::CREATED, Json(dto::job_to_json(&job))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn shift_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_id): Path<String>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_id("account_id", &account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let view = services.dispatch().shift_status(account_id).await;
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "online": view.online,
            "shift_open": view.shift_open,
            "shift_opened_at": view.shift_opened_at.map(|t| t.to_rfc3339()),
            "provider": view.provider.as_ref().map(|p| p.as_str()),
            "last_updated": view.last_updated.map(|t| t.to_rfc3339()),
        })),
    )
        .into_response()
}

pub async fn upsert_printer_config(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_id): Path<String>,
    body: Result<Json<dto::PrinterConfigRequest>, JsonRejection>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_id("account_id", &account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };

    match services
        .dispatch()
        .upsert_printer_config(
            account_id,
            body.provider.unwrap_or_default(),
            body.settings.unwrap_or_else(|| serde_json::json!({})),
            body.is_active.unwrap_or(true),
        )
        .await
    {
        Ok(config) => (StatusCode::OK, Json(dto::printer_config_to_json(&config))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn provision_bridge(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_id): Path<String>,
    body: Result<Json<dto::ProvisionBridgeRequest>, JsonRejection>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_id("account_id", &account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };

    match services
        .dispatch()
        .provision_bridge(account_id, body.name.as_deref().unwrap_or_default())
        .await
    {
        Ok(credential) => {
            let mut json = dto::credential_to_json(&credential);
            json["token"] = serde_json::Value::String(credential.token.as_str().to_string());
            (StatusCode::CREATED, Json(json)).into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_bridges(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_id): Path<String>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_id("account_id", &account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.dispatch().list_bridges(account_id).await {
        Ok(credentials) => {
            let items = credentials.iter().map(dto::credential_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn revoke_bridge(
    Extension(services): Extension<Arc<AppServices>>,
    Path((account_id, bridge_id)): Path<(String, String)>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_id("account_id", &account_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let bridge_id: BridgeId = match errors::parse_id("bridge_id", &bridge_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.dispatch().revoke_bridge(account_id, bridge_id).await {
        Ok(credential) => (StatusCode::OK, Json(dto::credential_to_json(&credential))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
