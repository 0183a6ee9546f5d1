use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Uniform reply wrapper for every endpoint, errors included
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub timestamp: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            timestamp: timestamp(),
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self::error_with_details(code, message, None)
    }

    pub fn error_with_details(
        code: &'static str,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            timestamp: timestamp(),
            success: false,
            data: None,
            error: Some(ErrorBody {
                code,
                message: message.into(),
                details,
            }),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn success_omits_error() {
        let value = serde_json::to_value(ApiResponse::success(json!({"n": 1}))).unwrap();
        assert_eq!(value["success"], Value::Bool(true));
        assert_eq!(value["data"], json!({"n": 1}));
        assert!(value.get("error").is_none());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn error_omits_data_and_empty_details() {
        let value = serde_json::to_value(ApiResponse::error("INVALID_TOKEN", "Invalid token"))
            .unwrap();
        assert_eq!(value["success"], Value::Bool(false));
        assert!(value.get("data").is_none());
        assert_eq!(
            value["error"],
            json!({"code": "INVALID_TOKEN", "message": "Invalid token"})
        );
    }
}
