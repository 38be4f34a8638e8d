//! Greets whoever is named in the path: `curl http://127.0.0.1:8000/world`.

use dispatch_rs::{Api, Context, HttpServer, ServerConfig};
use log::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    env_logger::init();

    let mut api = Api::new();
    api.add_endpoint("GET/{name}", |ctx: Context| {
        format!("Hello, {}!", ctx.path_var("name").unwrap_or_default())
    })?;

    let config = ServerConfig {
        addr: "127.0.0.1:8000".parse()?,
        ..ServerConfig::default()
    };

    info!("Starting hello server");
    HttpServer::new(config, api).start().await?;

    Ok(())
}
