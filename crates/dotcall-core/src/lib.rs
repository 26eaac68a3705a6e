//! dotcall Core — transport-agnostic pieces of the dotcall RPC server.
//!
//! This crate holds the error model, the reply envelope, the request
//! context and the service registry. It has **no HTTP server dependency**
//! by default, making it usable from:
//!
//! - the axum-based server (`dotcall-server`)
//! - the CLI, for in-process calls
//! - tests that drive services without a listener
//!
//! # Feature Flags
//!
//! - `axum`: enables `IntoResponse` on `RpcError`, rendering the reply envelope.

pub mod context;
pub mod envelope;
pub mod error;
pub mod invocation;
pub mod options;
pub mod registry;

// Convenience re-exports
pub use context::Context;
pub use envelope::Reply;
pub use error::{RegistryError, RpcError, DEFAULT_ERROR_STATUS};
pub use invocation::Invocation;
pub use options::{ErrorSink, LogOptions, ServerOptions, TracingErrorSink};
pub use registry::{MethodDescriptor, MethodSet, Service, ServiceRegistry};
