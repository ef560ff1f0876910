use axum::body::Bytes;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use fiscalbridge_auth::{BridgeCredential, BridgeHeartbeat};
use fiscalbridge_fiscal::{FiscalPrinterConfig, FiscalPrinterJob, JobStatus};
use fiscalbridge_infra::dispatch::{CompleteJob, FailJob, PushStatus};

use crate::app::errors;

// -------------------------
// Bridge protocol requests
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatRequest {
    pub version: Option<String>,
    pub info: Option<serde_json::Value>,
}

impl From<HeartbeatRequest> for BridgeHeartbeat {
    fn from(value: HeartbeatRequest) -> Self {
        BridgeHeartbeat {
            version: value.version.filter(|v| !v.trim().is_empty()),
            info: value.info.filter(|i| !i.is_null()),
        }
    }
}

/// `response_data` wins over `response` when a bridge sends both.
#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    pub fiscal_number: Option<String>,
    pub fiscal_document_id: Option<String>,
    pub response: Option<serde_json::Value>,
    pub response_data: Option<serde_json::Value>,
}

impl From<CompleteRequest> for CompleteJob {
    fn from(value: CompleteRequest) -> Self {
        CompleteJob {
            fiscal_number: value.fiscal_number,
            fiscal_document_id: value.fiscal_document_id,
            response: value.response_data.or(value.response),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteShiftRequest {
    pub response: Option<serde_json::Value>,
    pub response_data: Option<serde_json::Value>,
}

impl CompleteShiftRequest {
    pub fn into_response_payload(self) -> Option<serde_json::Value> {
        self.response_data.or(self.response)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FailRequest {
    pub error: Option<String>,
    pub response: Option<serde_json::Value>,
    pub response_data: Option<serde_json::Value>,
}

impl From<FailRequest> for FailJob {
    fn from(value: FailRequest) -> Self {
        FailJob {
            error: value.error,
            response: value.response_data.or(value.response),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PushStatusRequest {
    pub shift_open: Option<bool>,
    pub shift_opened_at: Option<String>,
    pub provider: Option<String>,
}

impl From<PushStatusRequest> for PushStatus {
    fn from(value: PushStatusRequest) -> Self {
        PushStatus {
            shift_open: value.shift_open,
            shift_opened_at: value.shift_opened_at,
            provider: value.provider,
        }
    }
}

// -------------------------
// Internal API requests
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

impl ListJobsQuery {
    pub fn status(&self) -> Result<Option<JobStatus>, axum::response::Response> {
        match self.status.as_deref().filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(raw) => JobStatus::parse(raw).map(Some).ok_or_else(|| {
                errors::validation_error(
                    Some("status"),
                    "status must be one of: pending, processing, completed, failed",
                )
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PrinterConfigRequest {
    pub provider: Option<String>,
    pub settings: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvisionBridgeRequest {
    pub name: Option<String>,
}

/// Bodies that may be empty (bridges often POST nothing to register/heartbeat).
pub fn optional_body<T: DeserializeOwned + Default>(
    body: &Bytes,
) -> Result<T, axum::response::Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| errors::validation_error(Some("body"), format!("invalid JSON body: {e}")))
}

// -------------------------
// Response mapping
// -------------------------

/// What a bridge needs to execute a job.
pub fn polled_job_to_json(job: &FiscalPrinterJob) -> serde_json::Value {
    serde_json::json!({
        "id": job.id.to_string(),
        "sale_id": job.sale_id.map(|id| id.to_string()),
        "return_id": job.return_id.map(|id| id.to_string()),
        "operation_type": job.operation_type.as_str(),
        "provider": job.provider.as_str(),
        "request_data": job.request_data,
        "retry_count": job.retry_count,
    })
}

pub fn job_to_json(job: &FiscalPrinterJob) -> serde_json::Value {
    serde_json::json!({
        "id": job.id.to_string(),
        "account_id": job.account_id.to_string(),
        "sale_id": job.sale_id.map(|id| id.to_string()),
        "return_id": job.return_id.map(|id| id.to_string()),
        "operation_type": job.operation_type.as_str(),
        "provider": job.provider.as_str(),
        "status": job.status.as_str(),
        "retry_count": job.retry_count,
        "next_retry_at": job.next_retry_at.map(|t| t.to_rfc3339()),
        "picked_up_at": job.picked_up_at.map(|t| t.to_rfc3339()),
        "reaped_at": job.reaped_at.map(|t| t.to_rfc3339()),
        "error_message": job.error_message,
        "fiscal_number": job.fiscal_number,
        "fiscal_document_id": job.fiscal_document_id,
        "request_data": job.request_data,
        "response_data": job.response_data,
        "created_at": job.created_at.to_rfc3339(),
        "updated_at": job.updated_at.to_rfc3339(),
        "completed_at": job.completed_at.map(|t| t.to_rfc3339()),
    })
}

/// Credentials are listed by fingerprint; the full token is shown only once.
pub fn credential_to_json(credential: &BridgeCredential) -> serde_json::Value {
    serde_json::json!({
        "id": credential.id.to_string(),
        "account_id": credential.account_id.to_string(),
        "name": credential.name,
        "status": credential.status.as_str(),
        "token_fingerprint": credential.token.fingerprint(),
        "last_version": credential.last_version,
        "last_info": credential.last_info,
        "last_heartbeat_at": credential.last_heartbeat_at.map(|t| t.to_rfc3339()),
        "created_at": credential.created_at.to_rfc3339(),
        "revoked_at": credential.revoked_at.map(|t| t.to_rfc3339()),
    })
}

pub fn printer_config_to_json(config: &FiscalPrinterConfig) -> serde_json::Value {
    serde_json::json!({
        "account_id": config.account_id.to_string(),
        "provider": config.provider.as_str(),
        "is_active": config.is_active,
        "settings": config.settings,
        "shift_open": config.shift_open,
        "shift_opened_at": config.shift_opened_at.map(|t| t.to_rfc3339()),
        "updated_at": config.updated_at.to_rfc3339(),
    })
}
