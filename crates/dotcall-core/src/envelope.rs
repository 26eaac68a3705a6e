//! The `{code, msg, data}` wrapper written for every response.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::RpcError;

/// Code reported by successful calls.
pub const SUCCESS_CODE: u16 = 200;

/// Reply envelope shared by successes and failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub code: u16,
    #[serde(default)]
    pub msg: String,
    /// Method result on success, optional payload on failure.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
}

/// A `data` key that is present, even as `null`, reads back as `Some`.
fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Reply {
    /// Build a success envelope. `data` is always present, possibly `null`.
    pub fn success(data: Value) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: String::new(),
            data: Some(data),
        }
    }

    /// Build a failure envelope carrying the error text and any attached payload.
    pub fn failure(code: u16, err: &RpcError) -> Self {
        Self {
            code,
            msg: err.to_string(),
            data: err.data().cloned(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}
