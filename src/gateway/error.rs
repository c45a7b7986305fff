//! Pre-commit errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::codec::{DecodeError, XmlRpcError};
use crate::rpc::Status;

/// Everything that can fail before the response status is written.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no method {0:?}")]
    UnknownMethod(String),

    #[error("missing method name")]
    MissingMethod,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    XmlRpc(#[from] XmlRpcError),

    #[error(transparent)]
    Call(#[from] Status),

    #[error("EOF: the call returned no records")]
    EmptyStream,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::UnknownMethod(_) | GatewayError::MissingMethod => StatusCode::NOT_FOUND,
            GatewayError::Decode(_) => StatusCode::BAD_REQUEST,
            GatewayError::XmlRpc(XmlRpcError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::XmlRpc(_) => StatusCode::BAD_REQUEST,
            GatewayError::Call(status) if status.is_auth_failure() => StatusCode::UNAUTHORIZED,
            GatewayError::Call(_) | GatewayError::EmptyStream => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "Error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}
