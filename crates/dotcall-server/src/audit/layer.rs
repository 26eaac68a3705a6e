//! Tower middleware feeding the audit log.
//!
//! The request body is wrapped so every data frame the handler reads is
//! copied into a pooled buffer. Once the inner service has answered, the
//! captured body and the response status are packed into a [`LogRecord`]
//! and queued on the [`AuditLogger`].

use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header;
use axum::response::Response;
use bytes::BytesMut;
use chrono::Local;
use futures::future::BoxFuture;
use http_body_util::BodyExt;
use tower::{Layer, Service};

use super::record::LogRecord;
use super::writer::AuditLogger;
use crate::server::remote_addr;

/// Wraps a service so each completed request is written to the audit log.
#[derive(Clone)]
pub struct AuditLayer {
    logger: AuditLogger,
}

impl AuditLayer {
    pub fn new(logger: AuditLogger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuditService<S> {
    inner: S,
    logger: AuditLogger,
}

/// Request fields captured before the body is handed to the inner service.
struct RequestLine {
    remote: String,
    method: String,
    rawpath: String,
    proto: String,
    user_agent: String,
    referer: String,
}

impl RequestLine {
    fn capture(parts: &axum::http::request::Parts) -> Self {
        let header_str = |name: header::HeaderName| {
            parts
                .headers
                .get(name)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .unwrap_or_default()
        };
        Self {
            remote: remote_addr(parts)
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| "-".to_string()),
            method: parts.method.to_string(),
            rawpath: parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| parts.uri.path().to_string()),
            proto: format!("{:?}", parts.version),
            user_agent: header_str(header::USER_AGENT),
            referer: header_str(header::REFERER),
        }
    }
}

impl<S> Service<Request> for AuditService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // The clone may not be ready; call the instance poll_ready was run on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let logger = self.logger.clone();

        let started = Instant::now();
        let (parts, body) = req.into_parts();
        let line = RequestLine::capture(&parts);

        let captured = Arc::new(Mutex::new(logger.pool().get()));
        let tee = Arc::clone(&captured);
        let body = Body::new(body.map_frame(move |frame| {
            if let Some(data) = frame.data_ref() {
                tee.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(data);
            }
            frame
        }));
        let req = Request::from_parts(parts, body);

        Box::pin(async move {
            let resp = inner.call(req).await?;

            let buf = std::mem::replace(
                &mut *captured.lock().unwrap_or_else(PoisonError::into_inner),
                BytesMut::new(),
            );
            let body = String::from_utf8_lossy(&buf).into_owned();
            logger.pool().put(buf);

            let record = LogRecord {
                time: Local::now(),
                remote: line.remote,
                method: line.method,
                rawpath: line.rawpath,
                status: resp.status().as_u16(),
                user_agent: line.user_agent,
                referer: line.referer,
                proto: line.proto,
                body,
                used: started.elapsed().as_secs_f64(),
            };
            logger.log(record).await;
            Ok(resp)
        })
    }
}
