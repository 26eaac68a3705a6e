//! Type-erased, single-use method calls.
//!
//! A [`MethodDescriptor`](crate::registry::MethodDescriptor) hands out a fresh
//! `Invocation` per request. It starts with the zero value (`Default`) of
//! the method's concrete argument type; a codec fills it through one of the
//! `decode_*` entry points, the pipeline optionally validates it, and
//! `invoke` consumes it to run the bound handler.

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use validator::Validate;

use crate::context::Context;
use crate::error::RpcError;

/// Handler with its receiver already bound.
pub(crate) type BoundMethod<A, R> =
    Arc<dyn Fn(Context, A) -> BoxFuture<'static, Result<R, RpcError>> + Send + Sync>;

/// One pending call: argument slot plus the handler that will consume it.
pub trait Invocation: Send {
    /// Name of the concrete argument type, for diagnostics.
    fn args_type(&self) -> &'static str;

    /// Fill the argument slot from a JSON document.
    fn decode_json(&mut self, body: &[u8]) -> Result<(), RpcError>;

    /// Fill the argument slot from `application/x-www-form-urlencoded` pairs.
    fn decode_form(&mut self, form: &[u8]) -> Result<(), RpcError>;

    /// Run the argument type's field constraints.
    fn validate(&self) -> Result<(), RpcError>;

    /// Call the handler and serialize its reply.
    fn invoke(self: Box<Self>, ctx: Context) -> BoxFuture<'static, Result<Value, RpcError>>;
}

pub(crate) struct TypedInvocation<A, R> {
    args: A,
    method: BoundMethod<A, R>,
    _reply: PhantomData<fn() -> R>,
}

impl<A: Default, R> TypedInvocation<A, R> {
    pub(crate) fn new(method: BoundMethod<A, R>) -> Self {
        Self {
            args: A::default(),
            method,
            _reply: PhantomData,
        }
    }
}

impl<A, R> Invocation for TypedInvocation<A, R>
where
    A: DeserializeOwned + Validate + Default + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn args_type(&self) -> &'static str {
        type_name::<A>()
    }

    fn decode_json(&mut self, body: &[u8]) -> Result<(), RpcError> {
        self.args = serde_json::from_slice(body).map_err(|e| RpcError::Decode(e.to_string()))?;
        Ok(())
    }

    fn decode_form(&mut self, form: &[u8]) -> Result<(), RpcError> {
        self.args =
            serde_urlencoded::from_bytes(form).map_err(|e| RpcError::Decode(e.to_string()))?;
        Ok(())
    }

    fn validate(&self) -> Result<(), RpcError> {
        self.args.validate().map_err(RpcError::from)
    }

    fn invoke(self: Box<Self>, ctx: Context) -> BoxFuture<'static, Result<Value, RpcError>> {
        let TypedInvocation { args, method, .. } = *self;
        Box::pin(async move {
            let reply = method(ctx, args).await?;
            serde_json::to_value(reply).map_err(|e| RpcError::Encode(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, Validate)]
    #[serde(default)]
    struct Greeting {
        #[validate(length(min = 1))]
        name: String,
        times: u32,
    }

    fn greeter() -> TypedInvocation<Greeting, String> {
        let method: BoundMethod<Greeting, String> = Arc::new(
            |_ctx: Context, args: Greeting| -> BoxFuture<'static, Result<String, RpcError>> {
                Box::pin(async move { Ok(format!("{} x{}", args.name, args.times)) })
            },
        );
        TypedInvocation::new(method)
    }

    #[tokio::test]
    async fn test_json_decode_and_invoke() {
        let mut call = Box::new(greeter());
        call.decode_json(br#"{"name":"ann","times":2}"#).unwrap();
        call.validate().unwrap();
        let value = call.invoke(Context::new("greet", "Hello")).await.unwrap();
        assert_eq!(value, Value::String("ann x2".into()));
    }

    #[tokio::test]
    async fn test_form_decode_parses_numbers() {
        let mut call = Box::new(greeter());
        call.decode_form(b"name=bob&times=3").unwrap();
        let value = call.invoke(Context::new("greet", "Hello")).await.unwrap();
        assert_eq!(value, Value::String("bob x3".into()));
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let mut call = greeter();
        let err = call.decode_json(b"{not json").unwrap_err();
        assert!(matches!(err, RpcError::Decode(_)));
    }

    #[test]
    fn test_validation_reports_fields() {
        let mut call = greeter();
        call.decode_json(br#"{"name":""}"#).unwrap();
        let err = call.validate().unwrap_err();
        assert_eq!(err.status(400), 400);
        assert!(err.data().unwrap().get("name").is_some());
    }

    #[tokio::test]
    async fn test_missing_fields_keep_zero_values() {
        let mut call = Box::new(greeter());
        call.decode_json(b"{}").unwrap();
        let value = call.invoke(Context::new("greet", "Hello")).await.unwrap();
        assert_eq!(value, Value::String(" x0".into()));
    }

    #[test]
    fn test_missing_required_field_fails_validation() {
        let mut call = greeter();
        call.decode_form(b"times=2").unwrap();
        let err = call.validate().unwrap_err();
        assert!(matches!(err, RpcError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_undecoded_slot_is_zero_value() {
        let call = Box::new(greeter());
        let value = call.invoke(Context::new("greet", "Hello")).await.unwrap();
        assert_eq!(value, Value::String(" x0".into()));
    }
}
