//! Response envelope shared by every controller

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::{json, Value};

/// `{"code", "success", "data"}` or `{"code", "success", "error"}`
#[derive(Debug)]
pub struct Envelope {
    status: StatusCode,
    body: Value,
}

impl Envelope {
    pub fn ok<T: Serialize>(data: T) -> Self {
        let data = serde_json::to_value(data).unwrap_or(Value::Null);
        Self {
            status: StatusCode::OK,
            body: json!({
                "code": StatusCode::OK.as_u16(),
                "success": true,
                "data": data,
            }),
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({
                "code": status.as_u16(),
                "success": false,
                "error": message.into(),
            }),
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
