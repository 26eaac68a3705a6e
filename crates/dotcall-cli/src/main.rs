//! dotcall CLI — serve object methods as HTTP RPC endpoints.
//!
//! Wraps the dotcall-server bootstrap with the bundled demo services
//! (`hello`, `echo`) and offers an in-process `call` for quick checks.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use dotcall_cli::commands;
use dotcall_core::options::DEFAULT_LOG_FORMAT;
use dotcall_core::LogOptions;

/// dotcall — HTTP RPC for plain service methods
#[derive(Parser)]
#[command(name = "dotcall", version, about = "dotcall — HTTP RPC for plain service methods")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long, env = "DOTCALL_HOST", default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, env = "DOTCALL_PORT", default_value_t = 8000)]
        port: u16,
        /// Skip argument validation before invoking methods
        #[arg(long, env = "DOTCALL_NO_VALIDATE")]
        no_validate: bool,
        /// Write an audit log into this directory
        #[arg(long, env = "DOTCALL_LOG_DIR")]
        log_dir: Option<PathBuf>,
        /// Audit log file prefix
        #[arg(long, env = "DOTCALL_LOG_PREFIX", default_value = "dotcall")]
        log_prefix: String,
        /// strftime pattern picking the rotation unit
        #[arg(long, env = "DOTCALL_LOG_SUFFIX", default_value = "%Y%m%d")]
        log_suffix: String,
        /// Line template (minijinja)
        #[arg(long, env = "DOTCALL_LOG_FORMAT", default_value = DEFAULT_LOG_FORMAT)]
        log_format: String,
        /// Seconds between audit log flushes
        #[arg(long, env = "DOTCALL_LOG_FLUSH_SECS", default_value_t = 3)]
        log_flush_secs: u64,
        /// Records buffered before requests wait on the writer
        #[arg(long, env = "DOTCALL_LOG_QUEUE", default_value_t = 1000)]
        log_queue: usize,
    },

    /// Call a method in process and print the reply envelope
    Call {
        /// Dotted method name (e.g. "hello.Hello")
        #[arg(long)]
        method: String,
        /// Request body
        #[arg(long, default_value = "{}")]
        params: String,
        /// Content type selecting the codec
        #[arg(long, default_value = "application/json")]
        content_type: String,
        /// Skip argument validation
        #[arg(long)]
        no_validate: bool,
    },

    /// List every callable method
    Methods,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dotcall=info,dotcall_server=info,tower_http=info".into()),
        )
        .init();

    let result = if let Some(command) = cli.command {
        match command {
            Commands::Serve {
                host,
                port,
                no_validate,
                log_dir,
                log_prefix,
                log_suffix,
                log_format,
                log_flush_secs,
                log_queue,
            } => {
                let log = log_dir.map(|base_dir| LogOptions {
                    base_dir,
                    prefix: log_prefix,
                    suffix: log_suffix,
                    format: log_format,
                    flush_interval: Duration::from_secs(log_flush_secs),
                    queue_capacity: log_queue,
                });
                commands::serve::run(host, port, !no_validate, log).await
            }

            Commands::Call {
                method,
                params,
                content_type,
                no_validate,
            } => commands::call::run(&method, &params, &content_type, !no_validate).await,

            Commands::Methods => commands::list_methods(),
        }
    } else {
        // No subcommand: show help
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
