//! Request execution pipeline.
//!
//! `Server` owns the codec table and the service registry, both filled at
//! startup and only read afterwards. Each request walks the same steps:
//!
//! 1. pick a codec from `Content-Type` (415 when none matches)
//! 2. derive `service.method` from the URL (400)
//! 3. open an `rpc` span for the call
//! 4. resolve the method descriptor (404)
//! 5. read and decode the body into the argument slot (400)
//! 6. validate the arguments when enabled (400)
//! 7. invoke the method, containing any panic (500)
//! 8. encode the reply, or the returned error (400 unless it declares a code)

use std::backtrace::Backtrace;
use std::cell::Cell;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::FutureExt;
use tracing::{Instrument, Span};

use dotcall_core::{
    Context, RegistryError, Reply, RpcError, Service, ServerOptions, ServiceRegistry,
    DEFAULT_ERROR_STATUS,
};

use crate::codec::{normalize_content_type, Codec, CodecRequest, FormCodec, JsonCodec, MethodName};

/// Serves registered services through registered codecs.
pub struct Server {
    options: ServerOptions,
    codecs: HashMap<String, Arc<dyn Codec>>,
    services: ServiceRegistry,
}

impl Server {
    /// An empty server: no codecs, no services.
    pub fn new(options: ServerOptions) -> Self {
        install_panic_hook();
        Self {
            options,
            codecs: HashMap::new(),
            services: ServiceRegistry::new(),
        }
    }

    /// A server with the JSON codec on `application/json` and the form codec
    /// on both the empty content type and `application/x-www-form-urlencoded`.
    pub fn with_default_codecs(options: ServerOptions) -> Self {
        let mut server = Self::new(options);
        server.register_codec(JsonCodec, "application/json");
        server.register_codec(FormCodec, "");
        server.register_codec(FormCodec, "application/x-www-form-urlencoded");
        server
    }

    /// Route requests whose `Content-Type` (parameters ignored, case
    /// insensitive) equals `content_type` to `codec`.
    pub fn register_codec(&mut self, codec: impl Codec, content_type: &str) {
        self.codecs
            .insert(normalize_content_type(content_type), Arc::new(codec));
    }

    /// Expose the methods of `receiver` under `name` (inferred from the type
    /// name when empty).
    pub fn register_service<S: Service>(
        &mut self,
        receiver: S,
        name: &str,
    ) -> Result<(), RegistryError> {
        self.services.register(receiver, name)
    }

    pub fn register_shared_service<S: Service>(
        &mut self,
        receiver: Arc<S>,
        name: &str,
    ) -> Result<(), RegistryError> {
        self.services.register_shared(receiver, name)
    }

    /// Whether `"Service.Method"` is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.services.has_method(method)
    }

    pub fn methods(&self) -> Vec<String> {
        self.services.methods()
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Wrap the server in an axum `Router` that sends every path to [`serve`](Self::serve).
    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(handle_rpc)
            .with_state(Arc::new(self))
    }

    /// Run one call in process, without a listener: POST `body` to the path
    /// derived from the dotted `method`, then return the status and the
    /// decoded reply envelope.
    pub async fn call_local(
        &self,
        method: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<(u16, Reply), String> {
        let (service, method) = method
            .split_once('.')
            .ok_or_else(|| format!("Method must look like service.Method, got {:?}", method))?;
        let mut builder = axum::http::Request::builder()
            .method(Method::POST)
            .uri(format!("/{}/{}", service, method));
        if !content_type.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let req = builder
            .body(Body::from(body.into()))
            .map_err(|e| format!("Failed to build request: {}", e))?;

        let resp = self.serve(req).await;
        let status = resp.status().as_u16();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read reply: {}", e))?;
        let reply = serde_json::from_slice(&bytes)
            .map_err(|e| format!("Invalid reply envelope: {}", e))?;
        Ok((status, reply))
    }

    fn select_codec(&self, headers: &HeaderMap) -> Result<&Arc<dyn Codec>, RpcError> {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .map(|v| normalize_content_type(&String::from_utf8_lossy(v.as_bytes())))
            .unwrap_or_default();

        // Without a Content-Type, a lone codec is the only sensible choice.
        if content_type.is_empty() && self.codecs.len() == 1 {
            if let Some(codec) = self.codecs.values().next() {
                return Ok(codec);
            }
        }
        self.codecs
            .get(&content_type)
            .ok_or(RpcError::UnsupportedMediaType(content_type))
    }

    /// Run one request through the pipeline. Never fails: every outcome is
    /// rendered as a reply envelope.
    pub async fn serve(&self, req: Request) -> Response {
        let (parts, body) = req.into_parts();

        let codec = match self.select_codec(&parts.headers) {
            Ok(codec) => codec,
            Err(err) => {
                tracing::debug!(error = %err, "Rejecting request");
                return err.into_response();
            }
        };
        let codec_req = codec.new_request(&parts);
        let name = match codec_req.method() {
            Ok(name) => name,
            Err(err) => return codec_req.write_error(400, &err),
        };

        let span = tracing::info_span!(
            "rpc",
            service = %name.service,
            method = %name.method,
            error = tracing::field::Empty,
        );
        self.call(parts, body, codec_req.as_ref(), &name, &span)
            .instrument(span.clone())
            .await
    }

    async fn call(
        &self,
        parts: Parts,
        body: Body,
        codec_req: &dyn CodecRequest,
        name: &MethodName,
        span: &Span,
    ) -> Response {
        let descriptor = match self.services.get(&name.dotted()) {
            Ok(descriptor) => descriptor,
            Err(err) => return reject(span, codec_req, 404, err),
        };

        let mut invocation = descriptor.new_invocation();
        let bytes = match axum::body::to_bytes(body, self.options.body_limit).await {
            Ok(bytes) => bytes,
            Err(e) => return reject(span, codec_req, 400, RpcError::Decode(e.to_string())),
        };
        if let Err(err) = codec_req.read_request(&bytes, invocation.as_mut()) {
            return reject(span, codec_req, 400, err);
        }
        if self.options.enable_validator {
            if let Err(err) = invocation.validate() {
                return reject(span, codec_req, 400, err);
            }
        }

        let remote_addr = remote_addr(&parts);
        let ctx = Context::new(&name.service, &name.method)
            .with_request(&parts)
            .with_remote_addr(remote_addr);

        match AssertUnwindSafe(invocation.invoke(ctx)).catch_unwind().await {
            Ok(Ok(value)) => {
                let mut resp = codec_req.write_response(value);
                set_nosniff(&mut resp);
                resp
            }
            Ok(Err(err)) => {
                let mut resp = reject(span, codec_req, DEFAULT_ERROR_STATUS, err);
                set_nosniff(&mut resp);
                resp
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                let remote = remote_addr
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let trace = take_panic_trace();
                self.options.error_sink.report(&format!(
                    "dotcall: panic serving {}: {} at {}\n{}",
                    remote, message, trace.location, trace.backtrace
                ));
                reject(span, codec_req, 500, RpcError::Panic(message))
            }
        }
    }
}

async fn handle_rpc(State(server): State<Arc<Server>>, req: Request) -> Response {
    server.serve(req).await
}

fn reject(span: &Span, codec_req: &dyn CodecRequest, status: u16, err: RpcError) -> Response {
    span.record("error", true);
    tracing::debug!(error = %err, "Call failed");
    codec_req.write_error(status, &err)
}

// Keep browsers from sniffing the reply away from the declared content type.
fn set_nosniff(resp: &mut Response) {
    resp.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
}

pub(crate) fn remote_addr(parts: &Parts) -> Option<SocketAddr> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Where a panic was raised, captured by the hook before unwinding starts.
struct PanicTrace {
    location: String,
    backtrace: Backtrace,
}

thread_local! {
    static PANIC_TRACE: Cell<Option<PanicTrace>> = const { Cell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

// The method future is polled inside `catch_unwind` on the thread that
// panics, so the recovery path reads the same thread-local the hook wrote.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|loc| loc.to_string())
                .unwrap_or_else(|| "unknown location".to_string());
            PANIC_TRACE.with(|slot| {
                slot.set(Some(PanicTrace {
                    location,
                    backtrace: Backtrace::force_capture(),
                }))
            });
            previous(info);
        }));
    });
}

fn take_panic_trace() -> PanicTrace {
    PANIC_TRACE
        .with(Cell::take)
        .unwrap_or_else(|| PanicTrace {
            location: "unknown location".to_string(),
            backtrace: Backtrace::force_capture(),
        })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
