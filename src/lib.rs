//! A small request-dispatch library for JSON APIs.
//!
//! Endpoints are registered against patterns such as `GET/user/{id}`. A call
//! is matched against the registered patterns in order, runs the endpoint's
//! middleware hooks, invokes its handler and normalizes the result into either
//! JSON data or an error. Transport adapters are provided for plain HTTP/1.x
//! and for API Gateway proxy events.
//!
//! # Features
//!
//! - Fixed-arity route patterns with `{name}` path variables
//! - An immutable, typed request [`Context`] that carries path variables and
//!   anything middleware adds
//! - Handlers as ordinary closures taking any of: nothing, the context, a JSON
//!   body, or both; returning nothing, a value, an error, or a result
//! - Per-endpoint middleware hooks that may rewrite the input or abort the call
//! - Panics inside handlers and hooks become an internal error, never a crash
//! - An async HTTP server with CORS preflight support
//!
//! # Examples
//!
//! ## Dispatching a call
//!
//! ```
//! use dispatch_rs::{Api, Context, Error};
//!
//! let mut api = Api::new();
//! api.add_endpoint("GET/{name}", |ctx: Context| {
//!     format!("Hello, {}!", ctx.path_var("name").unwrap_or_default())
//! })
//! .unwrap();
//!
//! let output = api.call(Context::new(), "GET", "/world", b"").unwrap();
//! assert_eq!(output, Some(serde_json::json!("Hello, world!")));
//!
//! let missing = api.call(Context::new(), "POST", "/world", b"");
//! assert!(matches!(missing, Err(Error::NotFound)));
//! ```
//!
//! ## Middleware
//!
//! ```
//! use dispatch_rs::{Api, ApiError, Context};
//!
//! let mut api = Api::new();
//! api.add_endpoint("GET/admin/stats", || 42)
//!     .unwrap()
//!     .with_hook(|input| {
//!         if input.context.value::<AdminKey>().is_some() {
//!             Ok(input)
//!         } else {
//!             Err(ApiError::new(403, "Forbidden").into())
//!         }
//!     });
//!
//! struct AdminKey;
//! impl dispatch_rs::ContextKey for AdminKey {
//!     type Value = ();
//! }
//!
//! let denied = api.call(Context::new(), "GET", "/admin/stats", b"").unwrap_err();
//! assert_eq!(denied.to_string(), "Forbidden");
//!
//! let ctx = Context::new().with_value::<AdminKey>(());
//! assert_eq!(api.call(ctx, "GET", "/admin/stats", b"").unwrap(), Some(serde_json::json!(42)));
//! ```
//!
//! ## Serving over HTTP
//!
//! ```no_run
//! use dispatch_rs::{Api, HttpServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dispatch_rs::HttpError> {
//!     let mut api = Api::new();
//!     api.add_endpoint("GET/ping", || "pong").unwrap();
//!
//!     HttpServer::new(ServerConfig::default(), api).start().await
//! }
//! ```
//!
//! See the `demos` directory for a complete server.

// Export the dispatch core
pub mod dispatch;

// Export the transport adapters
pub mod gateway;
pub mod http;

// Re-export commonly used items for convenience
pub use dispatch::{
    Api, ApiError, Arg, CallResult, Context, ContextKey, DynamicHandler, Endpoint, EndpointInput, Error, ErrorKind,
    Handler, IntoHandler, Json, Param, PathVars, PatternError, Returned, RoutePattern,
};
pub use gateway::{ApiGatewayProxyRequest, ApiGatewayProxyResponse, GatewayProxy};
pub use http::{Error as HttpError, HttpRequest, HttpResponse, HttpServer, ServerConfig, StatusCode};
