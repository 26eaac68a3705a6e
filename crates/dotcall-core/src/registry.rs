//! Service registry: the immutable `"Service.Method"` lookup table.
//!
//! Receivers implement [`Service`] and list their endpoints on a
//! [`MethodSet`]. Each endpoint is a plain async function taking the shared
//! receiver, the request [`Context`] and a typed argument struct:
//!
//! ```ignore
//! struct Greeter;
//!
//! impl Greeter {
//!     async fn hello(self: Arc<Self>, _ctx: Context, req: HelloRequest) -> Result<HelloReply, RpcError> {
//!         Ok(HelloReply { reply: format!("hello {}", req.name) })
//!     }
//! }
//!
//! impl Service for Greeter {
//!     fn methods(methods: &mut MethodSet<Self>) {
//!         methods.method("Hello", Self::hello);
//!     }
//! }
//!
//! let mut registry = ServiceRegistry::new();
//! registry.register(Greeter, "hello")?;
//! assert!(registry.has_method("hello.Hello"));
//! ```
//!
//! The table is filled once at startup and only read while serving, so
//! lookups take no lock.

use std::any::type_name;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use validator::Validate;

use crate::context::Context;
use crate::error::{RegistryError, RpcError};
use crate::invocation::{BoundMethod, Invocation, TypedInvocation};

/// A receiver whose methods are exposed as RPC endpoints.
pub trait Service: Send + Sync + Sized + 'static {
    /// List the endpoints this receiver exposes.
    fn methods(methods: &mut MethodSet<Self>);
}

type InvocationFactory = Box<dyn Fn() -> Box<dyn Invocation> + Send + Sync>;

/// Immutable description of one callable endpoint.
pub struct MethodDescriptor {
    service: String,
    method: String,
    args_type: &'static str,
    factory: InvocationFactory,
}

impl MethodDescriptor {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Dotted `"Service.Method"` name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }

    pub fn args_type(&self) -> &'static str {
        self.args_type
    }

    /// Allocate an empty argument slot bound to this method's handler.
    pub fn new_invocation(&self) -> Box<dyn Invocation> {
        (self.factory)()
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("service", &self.service)
            .field("method", &self.method)
            .field("args_type", &self.args_type)
            .finish()
    }
}

/// A registered receiver and its exposed method set.
#[derive(Debug)]
pub struct ServiceDescriptor {
    name: String,
    receiver_type: &'static str,
    methods: HashMap<String, MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn receiver_type(&self) -> &'static str {
        self.receiver_type
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }
}

/// Collects the endpoints of one receiver during registration.
pub struct MethodSet<S> {
    service: String,
    receiver: Arc<S>,
    methods: HashMap<String, MethodDescriptor>,
    rejected: Vec<RegistryError>,
}

impl<S: Service> MethodSet<S> {
    fn new(service: String, receiver: Arc<S>) -> Self {
        Self {
            service,
            receiver,
            methods: HashMap::new(),
            rejected: Vec::new(),
        }
    }

    /// Name the service is being registered under.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Expose `handler` as `name`. Method names must be exported, i.e.
    /// start with an uppercase letter.
    ///
    /// Each call starts from `A::default()`; mark the argument struct
    /// `#[serde(default)]` so fields the request omits keep their zero value
    /// and only validation can reject them.
    pub fn method<A, R, F, Fut>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<S>, Context, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RpcError>> + Send + 'static,
        A: DeserializeOwned + Validate + Default + Send + 'static,
        R: Serialize + Send + 'static,
    {
        if !is_exported(name) {
            self.rejected.push(RegistryError::UnexportedMethod {
                service: self.service.clone(),
                method: name.to_string(),
            });
            return self;
        }
        if self.methods.contains_key(name) {
            self.rejected.push(RegistryError::DuplicateMethod {
                service: self.service.clone(),
                method: name.to_string(),
            });
            return self;
        }

        let receiver = Arc::clone(&self.receiver);
        let bound: BoundMethod<A, R> = Arc::new(
            move |ctx: Context, args: A| -> BoxFuture<'static, Result<R, RpcError>> {
                Box::pin(handler(Arc::clone(&receiver), ctx, args))
            },
        );

        let descriptor = MethodDescriptor {
            service: self.service.clone(),
            method: name.to_string(),
            args_type: type_name::<A>(),
            factory: Box::new(move || {
                Box::new(TypedInvocation::new(Arc::clone(&bound))) as Box<dyn Invocation>
            }),
        };
        self.methods.insert(name.to_string(), descriptor);
        self
    }
}

/// `"Service.Method"` → descriptor table.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, ServiceDescriptor>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `receiver` under `name`, or under its type name when `name`
    /// is empty.
    pub fn register<S: Service>(&mut self, receiver: S, name: &str) -> Result<(), RegistryError> {
        self.register_shared(Arc::new(receiver), name)
    }

    /// Same as [`register`](Self::register) for a receiver that is already shared.
    pub fn register_shared<S: Service>(
        &mut self,
        receiver: Arc<S>,
        name: &str,
    ) -> Result<(), RegistryError> {
        let name = if name.is_empty() {
            infer_service_name::<S>()
        } else {
            name.to_string()
        };
        if name.is_empty() || name.contains('.') || name.contains('/') {
            return Err(RegistryError::InvalidServiceName(name));
        }
        if self.services.contains_key(&name) {
            return Err(RegistryError::DuplicateService(name));
        }

        let mut set = MethodSet::new(name.clone(), receiver);
        S::methods(&mut set);
        if let Some(err) = set.rejected.into_iter().next() {
            return Err(err);
        }
        if set.methods.is_empty() {
            return Err(RegistryError::NoMethods(name));
        }

        tracing::debug!(
            service = %name,
            methods = set.methods.len(),
            "Registered service"
        );
        self.services.insert(
            name.clone(),
            ServiceDescriptor {
                name,
                receiver_type: type_name::<S>(),
                methods: set.methods,
            },
        );
        Ok(())
    }

    /// Resolve a dotted `"Service.Method"` name.
    pub fn get(&self, method: &str) -> Result<&MethodDescriptor, RpcError> {
        let (service_name, method_name) = method
            .split_once('.')
            .filter(|(_, m)| !m.contains('.'))
            .ok_or_else(|| RpcError::ServiceNotFound(method.to_string()))?;
        let service = self
            .services
            .get(service_name)
            .ok_or_else(|| RpcError::ServiceNotFound(service_name.to_string()))?;
        service
            .method(method_name)
            .ok_or_else(|| RpcError::MethodNotFound(method.to_string()))
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.get(method).is_ok()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    /// Every registered endpoint as `"Service.Method"`, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .values()
            .flat_map(|s| s.methods.values().map(MethodDescriptor::full_name))
            .collect();
        names.sort();
        names
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Last path segment of the receiver's type name, without generics.
fn infer_service_name<S>() -> String {
    let full = type_name::<S>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
