//! Server configuration.

use std::net::SocketAddr;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The largest request, headers and body included, the server will read.
    pub read_buffer_size: usize,
    /// Value of `Access-Control-Allow-Origin` on every response.
    pub cors_allowed_origin: String,
    /// Value of `Access-Control-Allow-Headers` on every response.
    pub cors_allowed_headers: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1024,
            read_buffer_size: 8192,
            cors_allowed_origin: "*".to_string(),
            cors_allowed_headers: "Content-Type, Authorization".to_string(),
        }
    }
}
