//! Codecs: one serialization scheme per content type.
//!
//! A [`Codec`] is registered on the [`Server`](crate::Server) under a content
//! type and produces a [`CodecRequest`] bound to each incoming request. The
//! codec request derives the dispatch name from the URL, decodes the body into
//! the method's argument slot and writes the reply envelope.
//!
//! Two codecs ship with the crate:
//!
//! - [`JsonCodec`]: the body is a JSON document
//! - [`FormCodec`]: URL query plus `application/x-www-form-urlencoded` body

use axum::body::Bytes;
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use dotcall_core::{Invocation, Reply, RpcError};

/// Produces a [`CodecRequest`] for every request routed to it.
pub trait Codec: Send + Sync + 'static {
    fn new_request(&self, parts: &Parts) -> Box<dyn CodecRequest>;
}

/// Dispatch target parsed from `/<service>/<method>[...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodName {
    pub service: String,
    pub method: String,
}

impl MethodName {
    /// Dotted `"service.method"` key used by the registry.
    pub fn dotted(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

/// Decodes one request and encodes its reply.
pub trait CodecRequest: Send + Sync {
    /// URI of the request this codec request is bound to.
    fn uri(&self) -> &Uri;

    /// Derive the method to call from the URL path.
    fn method(&self) -> Result<MethodName, RpcError> {
        method_from_path(self.uri().path())
    }

    /// Fill `into` from the request body.
    fn read_request(&self, body: &Bytes, into: &mut dyn Invocation) -> Result<(), RpcError>;

    /// Write a success envelope carrying `value`.
    fn write_response(&self, value: Value) -> Response {
        write_reply(StatusCode::OK, &Reply::success(value))
    }

    /// Write a failure envelope. Errors that carry their own code override
    /// `status`, and that code is also used for the HTTP status line.
    fn write_error(&self, status: u16, err: &RpcError) -> Response {
        let reply = err.to_reply(status);
        let http_status =
            StatusCode::from_u16(reply.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        write_reply(http_status, &reply)
    }
}

/// Split `path` on `/` and join the first two segments after the root.
pub fn method_from_path(path: &str) -> Result<MethodName, RpcError> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 3 {
        return Err(RpcError::BadUrl(path.to_string()));
    }
    let (service, method) = (segments[1], segments[2]);
    if service.contains('.') || method.contains('.') {
        return Err(RpcError::BadUrl(path.to_string()));
    }
    Ok(MethodName {
        service: service.to_string(),
        method: method.to_string(),
    })
}

/// Strip `;charset=...` and friends, then lowercase.
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

pub(crate) fn write_reply(status: StatusCode, reply: &Reply) -> Response {
    match serde_json::to_vec(reply) {
        Ok(mut body) => {
            body.push(b'\n');
            (
                status,
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                body,
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Failed to encode reply envelope: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Request bodies are JSON documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn new_request(&self, parts: &Parts) -> Box<dyn CodecRequest> {
        Box::new(JsonCodecRequest {
            uri: parts.uri.clone(),
        })
    }
}

struct JsonCodecRequest {
    uri: Uri,
}

impl CodecRequest for JsonCodecRequest {
    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn read_request(&self, body: &Bytes, into: &mut dyn Invocation) -> Result<(), RpcError> {
        into.decode_json(body)
    }
}

// ---------------------------------------------------------------------------
// Form
// ---------------------------------------------------------------------------

/// Arguments come from the URL query and a urlencoded body, matched to
/// argument fields by name. Body pairs come before query pairs and the last
/// value of a repeated key is the one decoded, so the query wins a clash.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormCodec;

impl Codec for FormCodec {
    fn new_request(&self, parts: &Parts) -> Box<dyn CodecRequest> {
        Box::new(FormCodecRequest {
            uri: parts.uri.clone(),
        })
    }
}

struct FormCodecRequest {
    uri: Uri,
}

impl FormCodecRequest {
    /// Body pairs then query pairs, each key kept once at its last value.
    fn merged_form(&self, body: &[u8]) -> Result<String, RpcError> {
        let mut pairs: Vec<(String, String)> =
            serde_urlencoded::from_bytes(body).map_err(|e| RpcError::Decode(e.to_string()))?;
        if let Some(query) = self.uri.query() {
            let query_pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
                .map_err(|e| RpcError::Decode(e.to_string()))?;
            pairs.extend(query_pairs);
        }

        let mut seen = std::collections::HashSet::new();
        let mut merged: Vec<(String, String)> = pairs
            .into_iter()
            .rev()
            .filter(|(key, _)| seen.insert(key.clone()))
            .collect();
        merged.reverse();
        serde_urlencoded::to_string(&merged).map_err(|e| RpcError::Decode(e.to_string()))
    }
}

impl CodecRequest for FormCodecRequest {
    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn read_request(&self, body: &Bytes, into: &mut dyn Invocation) -> Result<(), RpcError> {
        let form = self.merged_form(body)?;
        into.decode_form(form.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use http_body_util::BodyExt;

    fn parts(uri: &str) -> Parts {
        Request::builder().uri(uri).body(()).unwrap().into_parts().0
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_method_from_path() {
        let name = method_from_path("/hello/Hello").unwrap();
        assert_eq!(name.dotted(), "hello.Hello");
        assert_eq!(method_from_path("/hello/Hello/extra").unwrap().dotted(), "hello.Hello");
        assert_eq!(method_from_path("/hello/").unwrap().dotted(), "hello.");
    }

    #[test]
    fn test_bad_urls() {
        for path in ["/", "/hello", "/a.b/C", "/a/b.c"] {
            assert!(
                matches!(method_from_path(path), Err(RpcError::BadUrl(_))),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_normalize_content_type() {
        assert_eq!(normalize_content_type("Application/JSON; charset=utf-8"), "application/json");
        assert_eq!(normalize_content_type(""), "");
        assert_eq!(
            normalize_content_type("application/x-www-form-urlencoded"),
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn test_form_last_value_wins() {
        let req = FormCodecRequest {
            uri: "/svc/M?name=query&extra=1".parse().unwrap(),
        };
        let merged = req.merged_form(b"name=body&only=2").unwrap();
        assert_eq!(merged, "only=2&name=query&extra=1");

        let req = FormCodecRequest {
            uri: "/svc/M?name=a&name=b".parse().unwrap(),
        };
        assert_eq!(req.merged_form(b"").unwrap(), "name=b");
    }

    #[tokio::test]
    async fn test_write_response_envelope() {
        let req = JsonCodec.new_request(&parts("/svc/M"));
        let resp = req.write_response(serde_json::json!({ "Reply": "hi" }));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        let body = body_json(resp).await;
        assert_eq!(body, serde_json::json!({ "code": 200, "msg": "", "data": { "Reply": "hi" } }));
    }

    #[tokio::test]
    async fn test_write_error_explicit_code_overrides_status() {
        let req = JsonCodec.new_request(&parts("/svc/M"));
        let resp = req.write_error(400, &RpcError::with_data(440, "bad return", "payload"));
        assert_eq!(resp.status().as_u16(), 440);
        let body = body_json(resp).await;
        assert_eq!(body["code"], 440);
        assert_eq!(body["msg"], "bad return");
        assert_eq!(body["data"], "payload");
    }

    #[tokio::test]
    async fn test_write_error_opaque_uses_status() {
        let req = FormCodec.new_request(&parts("/svc/M"));
        let resp = req.write_error(400, &RpcError::other("nope"));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["code"], 400);
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_code_keeps_envelope_code() {
        let req = JsonCodec.new_request(&parts("/svc/M"));
        let resp = req.write_error(400, &RpcError::new(10001, "business failure"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["code"], 10001);
    }
}
