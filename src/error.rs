//! Unified error types for the collector.
//!
//! Defines [`CollectorError`] (the main crate error enum) using
//! `thiserror` for `Display` and `Error` derives. Pipeline errors carry
//! a stable `code` / `subcode` pair that is serialized into the
//! `{code, subcode, message}` JSON body every failed `/v1/logs` request
//! receives, with the HTTP status mapped per error kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Reason a record failed validation. Carried inside
/// [`CollectorError::Validation`] and surfaced as the `subcode` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSubcode {
    InvalidJson,
    MissingField,
    EmptyField,
    InvalidType,
    InvalidTimestamp,
}

impl ValidationSubcode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidJson => "INVALID_JSON",
            Self::MissingField => "MISSING_FIELD",
            Self::EmptyField => "EMPTY_FIELD",
            Self::InvalidType => "INVALID_TYPE",
            Self::InvalidTimestamp => "INVALID_TIMESTAMP",
        }
    }
}

/// Reason identity resolution rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSubcode {
    MissingToken,
    MalformedToken,
    UnknownToken,
}

impl AuthSubcode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingToken => "MISSING_TOKEN",
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::UnknownToken => "UNKNOWN_TOKEN",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CollectorError {
    #[error("record {record_index}: {message}")]
    Validation {
        subcode: ValidationSubcode,
        record_index: usize,
        message: String,
    },

    /// The request body itself could not be decoded; no record index
    /// exists yet, so the message carries no record prefix.
    #[error("{message}")]
    InvalidBody { message: String },

    #[error("{message}")]
    Auth {
        subcode: AuthSubcode,
        message: String,
    },

    #[error(
        "collector is not configured: set DEVLOGS_FORWARD_URL or DEVLOGS_OPENSEARCH_HOST/_URL"
    )]
    NotConfigured,

    #[error("store connection failed: {message}")]
    Connection { message: String },

    #[error("store rejected credentials")]
    AuthenticationFailure,

    #[error("index '{index}' does not exist")]
    IndexNotFound { index: String },

    #[error("store rejected payload: {message}")]
    Query { message: String },

    #[error("forwarding to upstream failed: {message}")]
    Forward { message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),
}

/// Wire shape of every error response from `/v1/logs`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcode: Option<String>,
    pub message: String,
}

impl CollectorError {
    /// Stable machine-readable error code for the response body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } | Self::InvalidBody { .. } => "VALIDATION_FAILED",
            Self::Auth { .. } => "AUTH_FAILED",
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::Connection { .. } => "STORE_UNAVAILABLE",
            Self::AuthenticationFailure => "STORE_AUTH_FAILED",
            Self::IndexNotFound { .. } => "INDEX_NOT_FOUND",
            Self::Query { .. } => "STORE_REJECTED",
            Self::Forward { .. } => "FORWARD_FAILED",
            _ => "INTERNAL",
        }
    }

    #[must_use]
    pub fn subcode(&self) -> Option<&'static str> {
        match self {
            Self::Validation { subcode, .. } => Some(subcode.as_str()),
            Self::InvalidBody { .. } => Some(ValidationSubcode::InvalidJson.as_str()),
            Self::Auth { subcode, .. } => Some(subcode.as_str()),
            _ => None,
        }
    }

    /// HTTP status for the caller: 400 for validation and auth-format
    /// errors, 401 for rejected credentials, 503 when the collector or
    /// its downstream cannot take the write.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            Self::Auth { subcode, .. } => match subcode {
                AuthSubcode::UnknownToken => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_REQUEST,
            },
            Self::AuthenticationFailure => StatusCode::UNAUTHORIZED,
            Self::NotConfigured
            | Self::Connection { .. }
            | Self::IndexNotFound { .. }
            | Self::Query { .. }
            | Self::Forward { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            subcode: self.subcode().map(str::to_string),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for CollectorError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400_with_subcode() {
        let err = CollectorError::Validation {
            subcode: ValidationSubcode::MissingField,
            record_index: 2,
            message: "missing field 'component'".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert_eq!(err.subcode(), Some("MISSING_FIELD"));
        assert!(err.to_string().contains("record 2"));
    }

    #[test]
    fn body_level_decode_errors_carry_no_record_prefix() {
        let err = CollectorError::InvalidBody {
            message: "request body is not a JSON object".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert_eq!(err.subcode(), Some("INVALID_JSON"));
        assert_eq!(err.to_string(), "request body is not a JSON object");
    }

    #[test]
    fn unknown_token_is_401_other_auth_errors_400() {
        let unknown = CollectorError::Auth {
            subcode: AuthSubcode::UnknownToken,
            message: "token not recognized".into(),
        };
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

        let malformed = CollectorError::Auth {
            subcode: AuthSubcode::MalformedToken,
            message: "token does not match dl1_<kid>_<secret>".into(),
        };
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn downstream_errors_are_503() {
        for err in [
            CollectorError::NotConfigured,
            CollectorError::Connection {
                message: "connection refused".into(),
            },
            CollectorError::IndexNotFound {
                index: "devlogs-0001".into(),
            },
            CollectorError::Query {
                message: "mapper_parsing_exception".into(),
            },
            CollectorError::Forward {
                message: "upstream returned 500".into(),
            },
        ] {
            assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE, "{err}");
        }
    }

    #[test]
    fn body_omits_subcode_when_absent() {
        let body = CollectorError::NotConfigured.body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "NOT_CONFIGURED");
        assert!(json.get("subcode").is_none());
    }
}
