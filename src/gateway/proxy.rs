//! Dispatching API Gateway proxy events through an [`Api`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use log::info;
use serde_json::Value;

use crate::dispatch::{Api, Context, ContextKey};
use crate::gateway::event::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use crate::http::StatusCode;

const ALLOWED_HEADERS: &str = "Authorization, Content-Type";

/// Headers a handler wants added to the gateway response.
///
/// Clones share the same map, so a handler can write through the copy it
/// finds in its [`Context`] and the proxy sees the result.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders(Arc<Mutex<HashMap<String, String>>>);

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a header.
    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// A copy of every header inserted so far.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

struct GatewayRequestKey;

impl ContextKey for GatewayRequestKey {
    type Value = ApiGatewayProxyRequest;
}

struct ResponseHeadersKey;

impl ContextKey for ResponseHeadersKey {
    type Value = ResponseHeaders;
}

/// The gateway event being served, if `ctx` came from a [`GatewayProxy`].
pub fn gateway_request(ctx: &Context) -> Option<&ApiGatewayProxyRequest> {
    ctx.value::<GatewayRequestKey>()
}

/// The response-header placeholder, if `ctx` came from a [`GatewayProxy`].
pub fn response_headers(ctx: &Context) -> Option<&ResponseHeaders> {
    ctx.value::<ResponseHeadersKey>()
}

/// Serves API Gateway proxy events from an [`Api`].
#[derive(Debug, Clone)]
pub struct GatewayProxy {
    api: Arc<Api>,
    cors_allowed_origin: String,
}

impl GatewayProxy {
    pub fn new(api: impl Into<Arc<Api>>, cors_allowed_origin: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            cors_allowed_origin: cors_allowed_origin.into(),
        }
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Answer one proxy event.
    ///
    /// Failures never escape: every error becomes a response whose status
    /// follows [`StatusCode::for_error`] and whose body is the error text.
    pub fn handle(&self, request: ApiGatewayProxyRequest) -> ApiGatewayProxyResponse {
        let start = Instant::now();
        let method = request.http_method.clone();
        let path = request.path.clone();

        let mut response = ApiGatewayProxyResponse {
            status_code: StatusCode::OK.as_u16(),
            ..ApiGatewayProxyResponse::default()
        };
        response
            .headers
            .insert("Access-Control-Allow-Origin".to_string(), self.cors_allowed_origin.clone());
        response
            .headers
            .insert("Access-Control-Allow-Headers".to_string(), ALLOWED_HEADERS.to_string());

        if method == "OPTIONS" {
            let methods = self.api.methods_for_path(&path).join(", ");
            response
                .headers
                .insert("Access-Control-Allow-Methods".to_string(), methods);
            info!("{elapsed:?} {method}{path} - {status}", elapsed = start.elapsed(), status = response.status_code);
            return response;
        }

        let headers = ResponseHeaders::new();
        let body = request.body.clone();
        let ctx = Context::new()
            .with_value::<GatewayRequestKey>(request)
            .with_value::<ResponseHeadersKey>(headers.clone());

        let result = self.api.call(ctx, &method, &path, body.as_bytes());
        response.headers.extend(headers.snapshot());

        match result.map(|value| serde_json::to_string(&value.unwrap_or(Value::Null))) {
            Ok(Ok(json)) => {
                response
                    .headers
                    .insert("Content-Type".to_string(), "application/json".to_string());
                response.body = json;
            }
            Ok(Err(e)) => {
                response.status_code = StatusCode::INTERNAL_SERVER_ERROR.as_u16();
                response.body = e.to_string();
            }
            Err(err) => {
                response.status_code = StatusCode::for_error(&err).as_u16();
                response.body = err.to_string();
            }
        }

        info!("{elapsed:?} {method}{path} - {status}", elapsed = start.elapsed(), status = response.status_code);
        response
    }

    /// Answer a raw JSON-encoded event with a JSON-encoded response.
    pub fn handle_json(&self, event: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
        let request: ApiGatewayProxyRequest = serde_json::from_slice(event)?;
        serde_json::to_vec(&self.handle(request))
    }
}
