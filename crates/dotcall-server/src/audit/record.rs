use chrono::{DateTime, Local};
use serde::Serialize;

/// Timestamp layout used in audit lines, e.g. `02/Jan/2006:15:04:05 -0700`.
pub const TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// One completed request, as captured by the audit layer.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// When the request finished.
    pub time: DateTime<Local>,
    /// Client host, port stripped.
    pub remote: String,
    pub method: String,
    /// Path plus query string, as received.
    pub rawpath: String,
    pub status: u16,
    pub user_agent: String,
    pub referer: String,
    pub proto: String,
    /// Request body bytes the handler read.
    pub body: String,
    /// Elapsed seconds.
    pub used: f64,
}

/// Template context: a record with every field rendered for the log line.
#[derive(Debug, Default, Serialize)]
pub(crate) struct LogLine {
    remote: String,
    time: String,
    method: String,
    rawpath: String,
    proto: String,
    status: u16,
    user_agent: String,
    referer: String,
    body: String,
    used: f64,
}

impl From<LogRecord> for LogLine {
    fn from(record: LogRecord) -> Self {
        let body = compact_body(&record.body);
        Self {
            remote: record.remote,
            time: record.time.format(TIME_FORMAT).to_string(),
            method: record.method,
            rawpath: record.rawpath,
            proto: record.proto,
            status: if record.status == 0 { 200 } else { record.status },
            user_agent: format!("{:?}", record.user_agent),
            referer: record.referer,
            body: if body.is_empty() { "-".to_string() } else { body },
            used: record.used,
        }
    }
}

/// Fold a body onto a single line.
fn compact_body(body: &str) -> String {
    body.replace("\r\n", " ").replace('\n', " ")
}
