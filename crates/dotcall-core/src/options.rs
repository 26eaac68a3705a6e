//! Server and audit-log options.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Destination for errors that cannot be reported to the caller:
/// contained panics and audit-log write failures.
pub trait ErrorSink: Send + Sync {
    fn report(&self, message: &str);
}

/// Default sink: an `error` event on the `dotcall::error` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, message: &str) {
        tracing::error!(target: "dotcall::error", "{}", message);
    }
}

/// Default cap on request bodies read by the codecs.
pub const DEFAULT_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// Request execution options.
#[derive(Clone)]
pub struct ServerOptions {
    /// Where contained panics are reported.
    pub error_sink: Arc<dyn ErrorSink>,
    /// Run `validator` constraints on decoded arguments before invoking.
    pub enable_validator: bool,
    /// Largest request body, in bytes, a codec will read.
    pub body_limit: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            error_sink: Arc::new(TracingErrorSink),
            enable_validator: true,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("enable_validator", &self.enable_validator)
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

/// Default audit line, in the combined log style.
///
/// Available fields: `remote`, `time`, `method`, `rawpath`, `proto`,
/// `status`, `user_agent`, `referer`, `body`, `used`.
pub const DEFAULT_LOG_FORMAT: &str =
    r#"{{ remote }} [{{ time }}] "{{ method }} {{ rawpath }} {{ proto }}" {{ status }} {{ user_agent }} {{ used }}"#;

/// Audit-log options.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory holding the log files. Created on startup.
    pub base_dir: PathBuf,
    /// File name prefix: `<prefix>.<suffix>.log`.
    pub prefix: String,
    /// strftime pattern selecting the rotation unit; `%Y%m%d` rotates daily.
    pub suffix: String,
    /// minijinja template rendered once per request.
    pub format: String,
    /// Upper bound on how long a written line may sit in the buffer.
    pub flush_interval: Duration,
    /// Records queued before request handlers start waiting on the writer.
    pub queue_capacity: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("log"),
            prefix: "dotcall".to_string(),
            suffix: "%Y%m%d".to_string(),
            format: DEFAULT_LOG_FORMAT.to_string(),
            flush_interval: Duration::from_secs(3),
            queue_capacity: 1000,
        }
    }
}
