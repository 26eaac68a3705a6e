//! dotcall Server - expose service methods as HTTP RPC endpoints
//!
//! Built on axum, providing:
//! - `POST /<service>/<method>` dispatch into a [`dotcall_core::ServiceRegistry`]
//! - JSON and form codecs selected by `Content-Type`
//! - `{code, msg, data}` reply envelopes
//! - Optional audit log written to rotating files
//!
//! The [`Server`] can be driven directly (`Server::serve`) or mounted as an
//! axum `Router`; [`start_server`] binds a listener and runs it in the background.

pub mod audit;
pub mod codec;
pub mod server;

pub use codec::{Codec, CodecRequest, FormCodec, JsonCodec, MethodName};
pub use server::Server;

use std::net::SocketAddr;

use dotcall_core::LogOptions;
use tower_http::trace::TraceLayer;

use self::audit::{AuditLayer, AuditLogger};

/// Configuration for the listener.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Audit logging; disabled when `None`.
    pub log: Option<LogOptions>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            log: None,
        }
    }
}

/// Build the full application router: the RPC fallback, request tracing and,
/// when configured, the audit layer.
pub async fn build_router(
    server: Server,
    log: Option<LogOptions>,
) -> Result<axum::Router, String> {
    let error_sink = server.options().error_sink.clone();
    let mut app = server.into_router();

    if let Some(options) = log {
        let logger = AuditLogger::start(options, error_sink)
            .await
            .map_err(|e| format!("Failed to start audit log: {}", e))?;
        app = app.layer(AuditLayer::new(logger));
    }

    Ok(app.layer(TraceLayer::new_for_http()))
}

/// Start the dotcall HTTP server.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig, server: Server) -> Result<SocketAddr, String> {
    tracing::info!(
        "Starting dotcall server on {}:{} ({} methods)",
        config.host,
        config.port,
        server.methods().len()
    );

    let app = build_router(server, config.log).await?;

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("dotcall server listening on {}", local_addr);

    // Spawn the server in a background task
    tokio::spawn(async move {
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}
