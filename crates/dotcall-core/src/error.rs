//! Core error types for dotcall.
//!
//! `RpcError` is what every pipeline step and every service method fails with.
//! Each variant knows the HTTP-style status it maps to; `Application` carries
//! an explicit code chosen by the method author plus an optional payload, and
//! `Other` is an opaque failure that takes whatever default the caller picks.
//!
//! When the `axum` feature is enabled, `RpcError` also implements
//! `IntoResponse` so it can be rendered as a reply envelope directly.

use serde::Serialize;
use serde_json::Value;

use crate::envelope::Reply;

/// Status used for method failures that do not declare a code of their own.
pub const DEFAULT_ERROR_STATUS: u16 = 400;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("rpc: unrecognized Content-Type: {0}")]
    UnsupportedMediaType(String),

    #[error("bad url: {0}")]
    BadUrl(String),

    #[error("rpc: can't find service {0}")]
    ServiceNotFound(String),

    #[error("rpc: can't find method {0}")]
    MethodNotFound(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("validation error: {message}")]
    Validation { message: String, fields: Value },

    #[error("{0}")]
    Panic(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("{msg}")]
    Application {
        code: u16,
        msg: String,
        data: Option<Value>,
    },

    #[error("{0}")]
    Other(String),
}

impl RpcError {
    /// An application error with an explicit status code.
    pub fn new(code: u16, msg: impl Into<String>) -> Self {
        RpcError::Application {
            code,
            msg: msg.into(),
            data: None,
        }
    }

    /// An application error that also hands `data` back to the caller.
    ///
    /// A payload that cannot be serialized is reported as `null`.
    pub fn with_data<T: Serialize>(code: u16, msg: impl Into<String>, data: T) -> Self {
        RpcError::Application {
            code,
            msg: msg.into(),
            data: Some(serde_json::to_value(data).unwrap_or(Value::Null)),
        }
    }

    /// An opaque failure; the pipeline answers it with its default status.
    pub fn other(err: impl std::fmt::Display) -> Self {
        RpcError::Other(err.to_string())
    }

    /// The code declared by the method author, if any.
    pub fn explicit_code(&self) -> Option<u16> {
        match self {
            RpcError::Application { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Resolve the status to report, falling back to `default` for opaque errors.
    pub fn status(&self, default: u16) -> u16 {
        match self {
            RpcError::UnsupportedMediaType(_) => 415,
            RpcError::BadUrl(_) => 400,
            RpcError::ServiceNotFound(_) | RpcError::MethodNotFound(_) => 404,
            RpcError::Decode(_) | RpcError::Validation { .. } => 400,
            RpcError::Panic(_) | RpcError::Encode(_) => 500,
            RpcError::Application { code, .. } => *code,
            RpcError::Other(_) => default,
        }
    }

    /// Payload surfaced in the envelope's `data` field.
    pub fn data(&self) -> Option<&Value> {
        match self {
            RpcError::Application { data, .. } => data.as_ref(),
            RpcError::Validation { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Build the reply envelope for this error.
    pub fn to_reply(&self, default: u16) -> Reply {
        Reply::failure(self.status(default), self)
    }
}

impl From<validator::ValidationErrors> for RpcError {
    fn from(errors: validator::ValidationErrors) -> Self {
        RpcError::Validation {
            message: errors.to_string(),
            fields: serde_json::to_value(&errors).unwrap_or(Value::Null),
        }
    }
}

/// Configuration errors raised while building the service table.
///
/// These surface at startup, never per request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("rpc: service already defined: {0}")]
    DuplicateService(String),

    #[error("rpc: invalid service name {0:?}")]
    InvalidServiceName(String),

    #[error("rpc: method {method} of service {service} is not exported")]
    UnexportedMethod { service: String, method: String },

    #[error("rpc: method {method} defined twice on service {service}")]
    DuplicateMethod { service: String, method: String },

    #[error("rpc: {0} has no exported methods of suitable type")]
    NoMethods(String),
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for RpcError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let reply = self.to_reply(DEFAULT_ERROR_STATUS);
        let status =
            StatusCode::from_u16(reply.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(reply)).into_response()
    }
}
