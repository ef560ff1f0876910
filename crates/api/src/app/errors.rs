use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use fiscalbridge_infra::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Unauthorized => {
            json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid or revoked token")
        }
        DispatchError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        DispatchError::Validation { field, message } => validation_error(field.as_deref(), message),
        DispatchError::Store(msg) => {
            tracing::error!(error = %msg, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// 422 with an `errors` map keyed by the offending field, when known.
pub fn validation_error(field: Option<&str>, message: impl Into<String>) -> axum::response::Response {
    let message = message.into();
    let mut body = json!({
        "success": false,
        "error": "validation_error",
        "message": message,
    });
    if let Some(field) = field {
        body["errors"] = json!({});
        body["errors"][field] = json!([message]);
    }
    (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(body)).into_response()
}

pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    validation_error(Some("body"), rejection.body_text())
}

/// Parse a path id, answering 422 on garbage.
pub fn parse_id<T: FromStr>(field: &str, raw: &str) -> Result<T, axum::response::Response> {
    raw.parse::<T>()
        .map_err(|_| validation_error(Some(field), format!("{field} is not a valid id")))
}
