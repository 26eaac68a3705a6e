//! Demo services mounted by `dotcall serve`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use dotcall_core::{Context, MethodSet, RegistryError, RpcError, Service, ServerOptions};
use dotcall_server::Server;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "PascalCase", default)]
pub struct HelloRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HelloReply {
    pub reply: String,
}

/// Greets, or fails on purpose with a declared code.
pub struct HelloService;

impl HelloService {
    async fn hello(self: Arc<Self>, _ctx: Context, req: HelloRequest) -> Result<HelloReply, RpcError> {
        tracing::debug!(name = %req.name, "hello");
        Ok(HelloReply {
            reply: format!("hello {}", req.name),
        })
    }

    async fn hello_error(
        self: Arc<Self>,
        _ctx: Context,
        _req: HelloRequest,
    ) -> Result<HelloReply, RpcError> {
        Err(RpcError::new(440, "bad return"))
    }

    async fn hello_error_with_data(
        self: Arc<Self>,
        _ctx: Context,
        req: HelloRequest,
    ) -> Result<HelloReply, RpcError> {
        Err(RpcError::with_data(440, "bad return", req))
    }
}

impl Service for HelloService {
    fn methods(methods: &mut MethodSet<Self>) {
        methods
            .method("Hello", Self::hello)
            .method("HelloError", Self::hello_error)
            .method("HelloErrorWithData", Self::hello_error_with_data);
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "PascalCase", default)]
pub struct EchoRequest {
    #[validate(length(min = 1, message = "Body is required"))]
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EchoReply {
    pub body: String,
}

/// Returns the request body unchanged. `Body` must not be empty.
pub struct EchoService;

impl EchoService {
    async fn echo(self: Arc<Self>, _ctx: Context, req: EchoRequest) -> Result<EchoReply, RpcError> {
        Ok(EchoReply { body: req.body })
    }
}

impl Service for EchoService {
    fn methods(methods: &mut MethodSet<Self>) {
        methods.method("Echo", Self::echo);
    }
}

/// A server with the default codecs and both demo services, as `hello` and `echo`.
pub fn demo_server(options: ServerOptions) -> Result<Server, RegistryError> {
    let mut server = Server::with_default_codecs(options);
    server.register_service(HelloService, "hello")?;
    server.register_service(EchoService, "echo")?;
    Ok(server)
}
