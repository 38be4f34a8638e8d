//! HTTP server that answers requests through an [`Api`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::dispatch::{Api, Context};
use crate::http::config::ServerConfig;
use crate::http::error::{Error, ParseError};
use crate::http::request::{parse_request, HttpRequest};
use crate::http::response::{HttpResponse, StatusCode};

/// An HTTP server.
pub struct HttpServer {
    /// The server configuration.
    pub config: Arc<ServerConfig>,
    /// The endpoints requests are dispatched to.
    pub api: Arc<Api>,
}

impl HttpServer {
    /// Create a new HTTP server serving `api` with the given configuration.
    pub fn new(config: ServerConfig, api: impl Into<Arc<Api>>) -> Self {
        Self {
            config: Arc::new(config),
            api: api.into(),
        }
    }

    fn display_server_info(&self) {
        info!("Registered endpoints:");
        for endpoint in self.api.endpoints() {
            info!("  {pattern}", pattern = endpoint.pattern());
        }
    }

    async fn setup_listener(&self) -> Result<TcpListener, Error> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        info!("Server listening on http://{addr}", addr = self.config.addr);
        Ok(listener)
    }

    /// Set up a Ctrl+C handler for graceful shutdown.
    fn setup_ctrl_c_handler(shutdown_tx: mpsc::Sender<()>, tasks: &mut JoinSet<()>) {
        tasks.spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    let _ = shutdown_tx.send(()).await;
                }
                Err(e) => {
                    error!("Error setting up Ctrl+C handler: {e}");
                }
            }
        });
    }

    async fn handle_new_connection(
        mut socket: tokio::net::TcpStream,
        addr: SocketAddr,
        semaphore: Arc<Semaphore>,
        api: Arc<Api>,
        config: Arc<ServerConfig>,
        tasks: &mut JoinSet<()>,
    ) {
        let permit = match semaphore.try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, rejecting connection from {addr}");
                let response = HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE)
                    .with_content_type("text/plain")
                    .with_body_string("Server is at capacity, please try again later");
                let _ = socket.write_all(&response.to_bytes()).await;
                return;
            }
        };

        tasks.spawn(async move {
            // The permit is dropped when the task completes, releasing the semaphore slot
            let _permit = permit;

            if let Err(e) = Self::handle_connection(&mut socket, api, &config).await {
                error!("Error handling connection from {addr}: {e}");
            }
        });
    }

    /// Handle connection errors. Returns true if the accept loop should stop.
    async fn handle_connection_error(e: std::io::Error) -> bool {
        error!("Error accepting connection: {e}");

        if e.kind() == std::io::ErrorKind::BrokenPipe {
            error!("Critical error accepting connection, shutting down");
            return true;
        }

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        false
    }

    async fn perform_shutdown(tasks: &mut JoinSet<()>) {
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let shutdown_timeout = tokio::time::Duration::from_secs(30);
        let _ = tokio::time::timeout(shutdown_timeout, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await;

        info!("Server shutdown complete");
    }

    /// Start the server and listen for incoming connections.
    pub async fn start(&self) -> Result<(), Error> {
        self.display_server_info();

        let listener = self.setup_listener().await?;
        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let mut tasks = JoinSet::new();

        Self::setup_ctrl_c_handler(shutdown_tx, &mut tasks);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server...");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, addr)) => {
                            Self::handle_new_connection(
                                socket,
                                addr,
                                semaphore.clone(),
                                self.api.clone(),
                                self.config.clone(),
                                &mut tasks,
                            ).await;
                        }
                        Err(e) => {
                            if Self::handle_connection_error(e).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        Self::perform_shutdown(&mut tasks).await;

        Ok(())
    }

    /// Read until a complete request has arrived, the peer stops sending, or
    /// `limit` bytes have been buffered.
    async fn read_request(
        socket: &mut (impl AsyncRead + Unpin),
        limit: usize,
    ) -> Result<Option<HttpRequest>, Error> {
        let mut buf = Vec::new();
        let mut chunk = vec![0; limit.clamp(1, 8192)];

        loop {
            let n = socket.read(&mut chunk).await?;
            if n == 0 && buf.is_empty() {
                return Ok(None); // Connection closed
            }
            buf.extend_from_slice(&chunk[..n]);

            match parse_request(&buf) {
                Err(ParseError::Incomplete) if n > 0 && buf.len() < limit => continue,
                result => return Ok(Some(result?)),
            }
        }
    }

    /// Handle a single connection.
    pub async fn handle_connection(
        socket: &mut (impl AsyncRead + AsyncWrite + Unpin),
        api: Arc<Api>,
        config: &ServerConfig,
    ) -> Result<(), Error> {
        let start = Instant::now();

        let request = match Self::read_request(&mut *socket, config.read_buffer_size).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(Error::Parse(e)) => {
                let response = HttpResponse::new(StatusCode::BAD_REQUEST)
                    .with_content_type("text/plain")
                    .with_body_string(format!("Error parsing request: {e}"));
                socket.write_all(&response.to_bytes()).await?;
                return Err(Error::Parse(e));
            }
            Err(e) => return Err(e),
        };

        let line = format!("{}{}", request.method, request.path);
        let response = Self::respond(api, config, request).await;
        info!("{elapsed:?} {line} - {status}", elapsed = start.elapsed(), status = response.status);

        socket.write_all(&response.to_bytes()).await?;
        Ok(())
    }

    /// Answer one parsed request.
    ///
    /// `OPTIONS` is answered from the registry without dispatching; everything
    /// else runs through [`Api::call`] on a blocking worker thread.
    pub async fn respond(api: Arc<Api>, config: &ServerConfig, request: HttpRequest) -> HttpResponse {
        let response = HttpResponse::new(StatusCode::OK)
            .with_header("Access-Control-Allow-Origin", &config.cors_allowed_origin)
            .with_header("Access-Control-Allow-Headers", &config.cors_allowed_headers);

        if request.method == "OPTIONS" {
            let methods = api.methods_for_path(&request.path).join(", ");
            return response.with_header("Access-Control-Allow-Methods", methods);
        }

        let method = request.method.clone();
        let path = request.path.clone();
        let body = request.body.clone();
        let ctx = request.into_context(&Context::new());

        let outcome = tokio::task::spawn_blocking(move || api.call(ctx, &method, &path, &body)).await;
        match outcome {
            Ok(Ok(value)) => {
                let value = value.unwrap_or(Value::Null);
                match response.clone().with_json(&value) {
                    Ok(response) => response,
                    Err(e) => response
                        .with_status(StatusCode::INTERNAL_SERVER_ERROR)
                        .with_content_type("text/plain")
                        .with_body_string(e.to_string()),
                }
            }
            Ok(Err(err)) => response.with_error(&err),
            Err(e) => {
                error!("Dispatch task failed: {e}");
                response
                    .with_status(StatusCode::INTERNAL_SERVER_ERROR)
                    .with_content_type("text/plain")
                    .with_body_string("Internal error")
            }
        }
    }
}
