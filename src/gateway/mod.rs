//! API Gateway proxy-integration adapter.
//!
//! Turns a gateway proxy event into an [`Api::call`](crate::Api::call) and
//! the result into a proxy response, with the same CORS handling and status
//! mapping as the HTTP server. Handlers reach the inbound event through
//! [`gateway_request`] and can add response headers through
//! [`response_headers`].

mod event;
mod proxy;

// Re-export public items
pub use event::{authorizer_subject, ApiGatewayProxyRequest, ApiGatewayProxyResponse, ProxyRequestContext};
pub use proxy::{gateway_request, response_headers, GatewayProxy, ResponseHeaders};
