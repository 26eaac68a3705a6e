//! Audit log tests: requests go through the real router plus `AuditLayer`,
//! lines land in a temporary directory.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use validator::Validate;

use dotcall_core::{
    Context, ErrorSink, LogOptions, MethodSet, RpcError, Service, ServerOptions, TracingErrorSink,
};
use dotcall_server::audit::{AuditError, AuditLayer, AuditLogger};
use dotcall_server::Server;

#[derive(Debug, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "PascalCase", default)]
struct HelloRequest {
    name: String,
}

struct HelloService;

impl HelloService {
    async fn hello(self: Arc<Self>, _ctx: Context, req: HelloRequest) -> Result<String, RpcError> {
        Ok(format!("hello {}", req.name))
    }
}

impl Service for HelloService {
    fn methods(methods: &mut MethodSet<Self>) {
        methods.method("Hello", Self::hello);
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ErrorSink for RecordingSink {
    fn report(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

fn log_options(dir: &Path, format: &str) -> LogOptions {
    LogOptions {
        base_dir: dir.to_path_buf(),
        prefix: "rpc".to_string(),
        format: format.to_string(),
        ..LogOptions::default()
    }
}

fn audited_router(logger: &AuditLogger) -> Router {
    let mut server = Server::with_default_codecs(ServerOptions::default());
    server.register_service(HelloService, "hello").unwrap();
    server.into_router().layer(AuditLayer::new(logger.clone()))
}

fn hello_request(path: &str, name: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "tester")
        .body(Body::from(format!(r#"{{"Name":"{}"}}"#, name)))
        .unwrap();
    let peer: SocketAddr = "10.0.0.7:5555".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));
    req
}

/// Every line of every `rpc.*.log` file, files taken in name order.
fn read_lines(dir: &Path) -> Vec<String> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            name.starts_with("rpc.") && name.ends_with(".log")
        })
        .collect();
    files.sort();
    files
        .iter()
        .flat_map(|path| {
            std::fs::read_to_string(path)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

#[tokio::test]
async fn test_one_line_per_request_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let logger = AuditLogger::start(
        log_options(dir.path(), "{{ method }} {{ rawpath }} {{ status }}"),
        Arc::new(TracingErrorSink),
    )
    .await
    .unwrap();
    let router = audited_router(&logger);

    for i in 0..5 {
        let resp = router
            .clone()
            .oneshot(hello_request(&format!("/hello/Hello?i={}", i), "x"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    logger.flush().await;

    let lines = read_lines(dir.path());
    assert_eq!(lines.len(), 5);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line, &format!("POST /hello/Hello?i={} 200", i));
    }

    let today = chrono::Local::now().format("%Y%m%d").to_string();
    assert!(dir.path().join(format!("rpc.{}.log", today)).exists());
}

#[tokio::test]
async fn test_captures_remote_body_status_and_agent() {
    let dir = tempfile::tempdir().unwrap();
    let logger = AuditLogger::start(
        log_options(
            dir.path(),
            "{{ remote }}|{{ status }}|{{ body }}|{{ user_agent }}|{{ proto }}",
        ),
        Arc::new(TracingErrorSink),
    )
    .await
    .unwrap();
    let router = audited_router(&logger);

    router.clone().oneshot(hello_request("/hello/Hello", "x")).await.unwrap();
    // Unknown method: answered before the body is read.
    router.oneshot(hello_request("/hello/Nope", "x")).await.unwrap();
    logger.flush().await;

    let lines = read_lines(dir.path());
    assert_eq!(
        lines,
        vec![
            r#"10.0.0.7|200|{"Name":"x"}|"tester"|HTTP/1.1"#.to_string(),
            r#"10.0.0.7|404|-|"tester"|HTTP/1.1"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_default_format_renders() {
    let dir = tempfile::tempdir().unwrap();
    let logger = AuditLogger::start(
        LogOptions {
            base_dir: dir.path().to_path_buf(),
            prefix: "rpc".to_string(),
            ..LogOptions::default()
        },
        Arc::new(TracingErrorSink),
    )
    .await
    .unwrap();

    audited_router(&logger)
        .oneshot(hello_request("/hello/Hello", "x"))
        .await
        .unwrap();
    logger.flush().await;

    let lines = read_lines(dir.path());
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("10.0.0.7 ["));
    assert!(lines[0].contains(r#""POST /hello/Hello HTTP/1.1" 200 "tester" "#));
}

#[tokio::test]
async fn test_invalid_template_fails_at_start() {
    let dir = tempfile::tempdir().unwrap();

    let unknown_field = AuditLogger::start(
        log_options(dir.path(), "{{ remote }} {{ colour }}"),
        Arc::new(TracingErrorSink),
    )
    .await;
    assert!(matches!(unknown_field, Err(AuditError::Format(_))));

    let broken_syntax = AuditLogger::start(
        log_options(dir.path(), "{{ remote "),
        Arc::new(TracingErrorSink),
    )
    .await;
    assert!(matches!(broken_syntax, Err(AuditError::Format(_))));
}

#[tokio::test]
async fn test_invalid_suffix_fails_at_start() {
    let dir = tempfile::tempdir().unwrap();
    let options = LogOptions {
        suffix: "%Y%Q".to_string(),
        ..log_options(dir.path(), "{{ remote }}")
    };
    let result = AuditLogger::start(options, Arc::new(TracingErrorSink)).await;
    assert!(matches!(result, Err(AuditError::Suffix(_))));
}

#[tokio::test]
async fn test_base_dir_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let logger = AuditLogger::start(log_options(&nested, "{{ status }}"), Arc::new(TracingErrorSink))
        .await
        .unwrap();
    audited_router(&logger)
        .oneshot(hello_request("/hello/Hello", "x"))
        .await
        .unwrap();
    logger.flush().await;
    assert_eq!(read_lines(&nested), vec!["200".to_string()]);
}

#[tokio::test]
async fn test_open_failure_goes_to_sink_not_caller() {
    let dir = tempfile::tempdir().unwrap();
    // A directory squatting on the log file name makes every open fail.
    std::fs::create_dir(dir.path().join("rpc.fixed.log")).unwrap();

    let sink = Arc::new(RecordingSink::default());
    let options = LogOptions {
        suffix: "fixed".to_string(),
        ..log_options(dir.path(), "{{ status }}")
    };
    let logger = AuditLogger::start(options, sink.clone()).await.unwrap();

    let resp = audited_router(&logger)
        .oneshot(hello_request("/hello/Hello", "x"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    logger.flush().await;

    let messages = sink.messages.lock().unwrap();
    assert!(messages.iter().any(|m| m.contains("Error opening")));
}

#[tokio::test]
async fn test_concurrent_requests_with_small_queue() {
    let dir = tempfile::tempdir().unwrap();
    let options = LogOptions {
        queue_capacity: 2,
        ..log_options(dir.path(), "{{ rawpath }}")
    };
    let logger = AuditLogger::start(options, Arc::new(TracingErrorSink))
        .await
        .unwrap();
    let router = audited_router(&logger);

    let mut handles = Vec::new();
    for i in 0..40 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            router
                .oneshot(hello_request(&format!("/hello/Hello?i={}", i), "x"))
                .await
                .unwrap()
                .status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
    logger.flush().await;

    let mut lines = read_lines(dir.path());
    assert_eq!(lines.len(), 40);
    lines.sort();
    lines.dedup();
    assert_eq!(lines.len(), 40);
}

#[tokio::test]
async fn test_periodic_flush_without_explicit_flush() {
    let dir = tempfile::tempdir().unwrap();
    let options = LogOptions {
        flush_interval: Duration::from_millis(50),
        ..log_options(dir.path(), "{{ status }}")
    };
    let logger = AuditLogger::start(options, Arc::new(TracingErrorSink))
        .await
        .unwrap();

    audited_router(&logger)
        .oneshot(hello_request("/hello/Hello", "x"))
        .await
        .unwrap();

    let mut lines = Vec::new();
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        lines = read_lines(dir.path());
        if !lines.is_empty() {
            break;
        }
    }
    assert_eq!(lines, vec!["200".to_string()]);
}
