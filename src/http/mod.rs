//! HTTP/1.x transport adapter.
//!
//! Parses requests off a socket, answers `OPTIONS` preflight from the
//! registry, runs every other request through [`Api::call`](crate::Api::call)
//! and writes the result back as JSON or as a plain-text error with the
//! matching status.

mod config;
mod error;
mod request;
mod response;
mod server;

// Re-export public items
pub use config::ServerConfig;
pub use error::{Error, ParseError};
pub use request::{parse_request, HttpRequest, HttpVersion};
pub use response::{HttpResponse, StatusCode};
pub use server::HttpServer;
