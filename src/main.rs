//! Chat Relay - Entry Point
//!
//! Loads configuration, binds the listener and runs the accept loop until
//! Ctrl-C.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{ChatServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let server = ChatServer::bind(&config).await?;
    info!("Chat relay listening on {}", server.local_addr()?);

    server.run_until_ctrl_c().await?;

    info!("Chat relay stopped");
    Ok(())
}
