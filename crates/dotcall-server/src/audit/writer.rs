//! AuditLogger — queue-fed writer for rotating access-log files.
//!
//! Storage path: `<base_dir>/<prefix>.<strftime(suffix)>.log`
//!
//! Features:
//! - One background task owns the open file; request handlers only enqueue
//! - Bounded queue: a full queue makes `log` wait instead of dropping records
//! - Rotation whenever the computed file name moves forward
//! - Periodic flush so lines reach disk even under low traffic
//! - Graceful error handling (write failures go to the error sink, never to callers)

use std::path::PathBuf;
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use minijinja::{Environment, UndefinedBehavior};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use dotcall_core::{ErrorSink, LogOptions};

use super::pool::BufferPool;
use super::record::{LogLine, LogRecord};

const TEMPLATE_NAME: &str = "line";

enum Command {
    Record(LogRecord),
    Flush(oneshot::Sender<()>),
}

/// Handle to the audit writer. Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<Command>,
    pool: Arc<BufferPool>,
}

impl AuditLogger {
    /// Validate `options` and spawn the writer task.
    ///
    /// Fails when the base directory cannot be created, the file suffix is
    /// not a valid strftime pattern, or the line template does not render
    /// against an empty record.
    pub async fn start(
        options: LogOptions,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Result<Self, AuditError> {
        if options.queue_capacity == 0 {
            return Err(AuditError::Option("queue_capacity must be positive".into()));
        }
        if options.flush_interval.is_zero() {
            return Err(AuditError::Option("flush_interval must be positive".into()));
        }
        validate_suffix(&options.suffix)?;
        let env = compile_template(&options.format)?;

        fs::create_dir_all(&options.base_dir).await.map_err(|e| {
            AuditError::Io(format!(
                "Failed to create log dir {}: {}",
                options.base_dir.display(),
                e
            ))
        })?;

        let (tx, rx) = mpsc::channel(options.queue_capacity);
        tracing::info!(
            "Audit log enabled in {} ({}.{}.log)",
            options.base_dir.display(),
            options.prefix,
            options.suffix
        );
        let writer = LogWriter {
            options,
            env,
            error_sink,
            current: None,
        };
        tokio::spawn(writer.run(rx));

        Ok(Self {
            tx,
            pool: Arc::new(BufferPool::default()),
        })
    }

    /// Queue a record. Waits while the queue is full.
    pub async fn log(&self, record: LogRecord) {
        if self.tx.send(Command::Record(record)).await.is_err() {
            tracing::warn!("[AuditLogger] Writer stopped, dropping record");
        }
    }

    /// Resolve once every record queued before this call is written and the
    /// file buffer has been flushed.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    pub(crate) fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }
}

/// Error type for audit logger setup.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Invalid log format: {0}")]
    Format(String),
    #[error("Invalid log file suffix: {0:?}")]
    Suffix(String),
    #[error("Invalid log option: {0}")]
    Option(String),
}

fn validate_suffix(suffix: &str) -> Result<(), AuditError> {
    if StrftimeItems::new(suffix).any(|item| matches!(item, Item::Error)) {
        return Err(AuditError::Suffix(suffix.to_string()));
    }
    Ok(())
}

/// Compile the line template and render it once against an empty record so
/// unknown fields fail here rather than on the first request.
fn compile_template(format: &str) -> Result<Environment<'static>, AuditError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_template_owned(TEMPLATE_NAME, format.to_string())
        .map_err(|e| AuditError::Format(e.to_string()))?;
    env.get_template(TEMPLATE_NAME)
        .and_then(|tmpl| tmpl.render(LogLine::default()))
        .map_err(|e| AuditError::Format(e.to_string()))?;
    Ok(env)
}

struct OpenFile {
    name: String,
    writer: BufWriter<File>,
}

/// The single consumer. Owns the open file; nothing else touches it.
struct LogWriter {
    options: LogOptions,
    env: Environment<'static>,
    error_sink: Arc<dyn ErrorSink>,
    current: Option<OpenFile>,
}

impl LogWriter {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut ticker = tokio::time::interval(self.options.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Record(record)) => self.write(record).await,
                    Some(Command::Flush(ack)) => {
                        self.flush().await;
                        let _ = ack.send(());
                    }
                    None => break,
                },
                _ = ticker.tick() => self.flush().await,
            }
        }

        self.flush().await;
        tracing::debug!("[AuditLogger] Queue closed, writer stopped");
    }

    async fn write(&mut self, record: LogRecord) {
        let path = self.file_path(&record);
        let name = path.to_string_lossy().into_owned();
        let rotate = match &self.current {
            Some(current) => name > current.name,
            None => true,
        };
        if rotate {
            self.rotate(path, name).await;
        }

        let mut line = match self.render(record) {
            Ok(line) => line,
            Err(e) => {
                self.error_sink
                    .report(&format!("[AuditLogger] Failed to render log line: {}", e));
                return;
            }
        };
        line.push('\n');

        let Some(current) = self.current.as_mut() else {
            return;
        };
        if let Err(e) = current.writer.write_all(line.as_bytes()).await {
            self.error_sink.report(&format!(
                "[AuditLogger] Failed to write {}: {}",
                current.name, e
            ));
        }
    }

    fn file_path(&self, record: &LogRecord) -> PathBuf {
        let file_name = format!(
            "{}.{}.log",
            self.options.prefix,
            record.time.format(&self.options.suffix)
        );
        self.options.base_dir.join(file_name)
    }

    fn render(&self, record: LogRecord) -> Result<String, minijinja::Error> {
        self.env
            .get_template(TEMPLATE_NAME)?
            .render(LogLine::from(record))
    }

    /// Close the current file (flushing it first) and open `path` for append.
    /// On failure no file is open and the next record retries.
    async fn rotate(&mut self, path: PathBuf, name: String) {
        if let Some(mut old) = self.current.take() {
            if let Err(e) = old.writer.flush().await {
                self.error_sink
                    .report(&format!("[AuditLogger] Failed to flush {}: {}", old.name, e));
            }
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                tracing::debug!("[AuditLogger] Writing to {}", name);
                self.current = Some(OpenFile {
                    name,
                    writer: BufWriter::new(file),
                });
            }
            Err(e) => {
                self.error_sink
                    .report(&format!("Error opening {:?}: {}", path.display(), e));
            }
        }
    }

    async fn flush(&mut self) {
        if let Some(current) = self.current.as_mut() {
            if let Err(e) = current.writer.flush().await {
                self.error_sink.report(&format!(
                    "[AuditLogger] Failed to flush {}: {}",
                    current.name, e
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotcall_core::TracingErrorSink;

    #[test]
    fn test_default_format_compiles() {
        assert!(compile_template(&LogOptions::default().format).is_ok());
    }

    #[test]
    fn test_unknown_field_fails_fast() {
        let err = compile_template("{{ remote }} {{ nosuchfield }}").unwrap_err();
        assert!(matches!(err, AuditError::Format(_)));
    }

    #[test]
    fn test_suffix_validation() {
        assert!(validate_suffix("%Y%m%d").is_ok());
        assert!(validate_suffix("%Y%m%d%H").is_ok());
        assert!(matches!(validate_suffix("%Q"), Err(AuditError::Suffix(_))));
    }

    fn record_at(day: u32, rawpath: &str) -> LogRecord {
        use chrono::TimeZone;
        LogRecord {
            time: chrono::Local.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            remote: "127.0.0.1".into(),
            method: "POST".into(),
            rawpath: rawpath.into(),
            status: 200,
            user_agent: String::new(),
            referer: String::new(),
            proto: "HTTP/1.1".into(),
            body: String::new(),
            used: 0.0,
        }
    }

    fn writer_in(dir: &std::path::Path) -> LogWriter {
        let options = LogOptions {
            base_dir: dir.to_path_buf(),
            prefix: "rpc".into(),
            format: "{{ rawpath }}".into(),
            ..LogOptions::default()
        };
        LogWriter {
            env: compile_template(&options.format).unwrap(),
            options,
            error_sink: Arc::new(TracingErrorSink),
            current: None,
        }
    }

    #[tokio::test]
    async fn test_rotates_forward_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = writer_in(dir.path());

        writer.write(record_at(7, "/a")).await;
        writer.write(record_at(8, "/b")).await;
        // A late record never reopens an older file.
        writer.write(record_at(7, "/c")).await;
        writer.flush().await;

        let day7 = std::fs::read_to_string(dir.path().join("rpc.20240307.log")).unwrap();
        let day8 = std::fs::read_to_string(dir.path().join("rpc.20240308.log")).unwrap();
        assert_eq!(day7, "/a\n");
        assert_eq!(day8, "/b\n/c\n");
    }

    #[tokio::test]
    async fn test_start_rejects_zero_capacity() {
        let options = LogOptions {
            queue_capacity: 0,
            ..LogOptions::default()
        };
        let result = AuditLogger::start(options, Arc::new(TracingErrorSink)).await;
        assert!(matches!(result, Err(AuditError::Option(_))));
    }
}
