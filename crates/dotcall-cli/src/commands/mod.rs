//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and drives the
//! same `Server` the HTTP listener uses.

pub mod call;
pub mod serve;

use dotcall_core::ServerOptions;

use crate::services::demo_server;

/// `dotcall methods`: list every callable `service.Method`.
pub fn list_methods() -> Result<(), String> {
    let server = demo_server(ServerOptions::default()).map_err(|e| e.to_string())?;
    for method in server.methods() {
        println!("{}", method);
    }
    Ok(())
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
