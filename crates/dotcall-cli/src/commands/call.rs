//! `dotcall call` — Invoke a method in process, without a listener.

use dotcall_core::{Reply, ServerOptions};
use dotcall_server::Server;

use super::print_json;
use crate::services::demo_server;

/// Send `params` to `method` (dotted `service.Method`) and return the status
/// plus the reply envelope.
///
/// JSON params are checked locally before dispatch; form params are passed
/// through untouched.
pub async fn invoke(
    server: &Server,
    method: &str,
    params: &str,
    content_type: &str,
) -> Result<(u16, Reply), String> {
    if content_type.starts_with("application/json") {
        serde_json::from_str::<serde_json::Value>(params)
            .map_err(|e| format!("Invalid JSON params: {}", e))?;
    }
    server
        .call_local(method, content_type, params.as_bytes().to_vec())
        .await
}

pub async fn run(
    method: &str,
    params: &str,
    content_type: &str,
    validate: bool,
) -> Result<(), String> {
    let options = ServerOptions {
        enable_validator: validate,
        ..ServerOptions::default()
    };
    let server = demo_server(options).map_err(|e| e.to_string())?;

    let (status, reply) = invoke(&server, method, params, content_type).await?;
    let value = serde_json::to_value(&reply).map_err(|e| e.to_string())?;
    print_json(&value);

    if status != 200 {
        return Err(format!("{} failed with status {}", method, status));
    }
    Ok(())
}
