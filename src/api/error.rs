use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, warn};

use super::ApiResponse;
use crate::auth::{GatewayError, TokenError};
use crate::geo::GeoError;
use crate::pop::PopError;
use crate::storage::StorageError;

/// Every failure that can reach a client, mapped onto the response envelope
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid token: {0}")]
    InvalidToken(#[source] TokenError),
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error("validation failed: {0:?}")]
    Validation(BTreeMap<String, String>),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("token issuance failed: {0}")]
    TokenIssue(#[source] TokenError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), message.into());
        ApiError::Validation(fields)
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidToken(_) => "INVALID_TOKEN",
            ApiError::Geo(GeoError::DatabaseInit { .. }) => "GEOIP_DATABASE_INIT_ERROR",
            ApiError::Geo(GeoError::InvalidIpAddress(_)) => "INVALID_IP_ADDRESS",
            ApiError::Geo(GeoError::LookupFailed { .. } | GeoError::LookupTimeout { .. }) => {
                "GEOIP_LOOKUP_ERROR"
            }
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Storage(_) | ApiError::TokenIssue(_) | ApiError::Internal(_) => {
                "INTERNAL_SERVER_ERROR"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            ApiError::Geo(GeoError::InvalidIpAddress(_)) | ApiError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Geo(_)
            | ApiError::Storage(_)
            | ApiError::TokenIssue(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::InvalidToken(_) => "Invalid token".to_string(),
            ApiError::Geo(err) => err.to_string(),
            ApiError::Validation(_) => "Validation failed".to_string(),
            ApiError::Storage(_) | ApiError::TokenIssue(_) | ApiError::Internal(_) => {
                "An unexpected error occurred".to_string()
            }
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected(token_err) => ApiError::InvalidToken(token_err),
            GatewayError::Geo(geo_err) => ApiError::Geo(geo_err),
            GatewayError::Issue(token_err) => ApiError::TokenIssue(token_err),
        }
    }
}

impl From<PopError> for ApiError {
    fn from(err: PopError) -> Self {
        match err {
            PopError::Storage(storage_err) => ApiError::Storage(storage_err),
            PopError::Token(token_err) => ApiError::TokenIssue(token_err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status.is_server_error() {
            error!(code, error = ?self, "request failed");
        } else {
            warn!(code, error = %self, "request rejected");
        }

        let details = match &self {
            ApiError::Validation(fields) => serde_json::to_value(fields).ok(),
            _ => None,
        };

        let body = ApiResponse::error_with_details(code, self.public_message(), details);
        (status, body).into_response()
    }
}
