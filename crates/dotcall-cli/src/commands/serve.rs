//! `dotcall serve` — Start the dotcall HTTP server with the demo services.

use dotcall_core::{LogOptions, ServerOptions};
use dotcall_server::ServerConfig;

use crate::services::demo_server;

pub async fn run(
    host: String,
    port: u16,
    validate: bool,
    log: Option<LogOptions>,
) -> Result<(), String> {
    let options = ServerOptions {
        enable_validator: validate,
        ..ServerOptions::default()
    };
    let server = demo_server(options).map_err(|e| format!("Failed to register services: {}", e))?;

    if let Some(ref log) = log {
        println!(
            "Audit log: {}/{}.{}.log",
            log.base_dir.display(),
            log.prefix,
            log.suffix
        );
    }

    let config = ServerConfig {
        host: host.clone(),
        port,
        log,
    };

    println!("Starting dotcall server on {}:{}...", host, port);

    let addr = dotcall_server::start_server(config, server).await?;
    println!("dotcall server listening on http://{}", addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(())
}
