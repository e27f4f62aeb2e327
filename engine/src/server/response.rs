//! Response envelope

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use deploy_api::ApiResult;
use tracing::{error, warn};

use crate::errors::EngineError;
use crate::models::deployment::Operator;

pub const OPERATOR_ID_HEADER: &str = "x-operator-id";
pub const OPERATOR_NAME_HEADER: &str = "x-operator-name";

/// Handler result; failures render as an error envelope
pub type ApiResponse<T> = Result<Json<ApiResult<T>>, EngineError>;

pub fn ok<T>(data: T) -> ApiResponse<T> {
    Ok(Json(ApiResult::ok(data)))
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let code = self.code();
        if code >= 500 {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ApiResult::<()>::error(code, self.to_string()))).into_response()
    }
}

/// Operator identity forwarded by the gateway
pub fn operator(headers: &HeaderMap) -> Operator {
    let mut operator = Operator::default();
    if let Some(id) = headers
        .get(OPERATOR_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
    {
        operator.id = id;
    }
    if let Some(name) = headers
        .get(OPERATOR_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        operator.name = name.to_string();
    }
    operator
}
