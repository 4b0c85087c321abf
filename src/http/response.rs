use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::FormError;
use crate::pipeline::deliver::DeliveryResults;

/// Failure body of the submit endpoints
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unauthorized_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_results: Option<DeliveryResults>,
}

impl From<FormError> for ErrorBody {
    fn from(err: FormError) -> Self {
        let message = err.client_message();
        let code = err.code();
        let mut body = ErrorBody {
            success: false,
            message,
            code,
            unauthorized_fields: None,
            allowed_fields: None,
            delivery_results: None,
        };
        match err {
            FormError::UnauthorizedFields {
                unauthorized,
                allowed,
            } => {
                body.unauthorized_fields = Some(unauthorized);
                body.allowed_fields = Some(allowed);
            }
            FormError::Send(results) => body.delivery_results = Some(*results),
            _ => {}
        }
        body
    }
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "submission failed");
        }
        (status, Json(ErrorBody::from(self))).into_response()
    }
}

/// `{message}` body of the read endpoints
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

pub fn message(status: StatusCode, message: &'static str) -> Response {
    (status, Json(Message { message })).into_response()
}
