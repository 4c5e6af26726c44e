//! Room-based Chat Relay Library
//!
//! A multi-client chat relay over persistent, length-prefixed streams
//! (TLS in production) built on tokio.
//!
//! # Features
//! - Username login with uniqueness enforced across all connections
//! - Named, ephemeral rooms with a default room joined at login
//! - Room broadcast and direct (private) messages
//! - Leave notices when a connection closes
//!
//! # Architecture
//! - `codec` frames `Message` values as a 4-byte big-endian length plus JSON
//! - Each connection runs a read loop (`handler`) and a write task that
//!   drains the session's outbound queue
//! - `Router` turns each inbound message into delivery directives
//! - `Registry` holds the username and room maps behind one lock; broadcasts
//!   iterate over a snapshot taken under that lock
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_relay::ChatServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chat_relay::AppError> {
//!     let listener = TcpListener::bind("127.0.0.1:8443").await?;
//!     ChatServer::new(listener).run_until_ctrl_c().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod tls;
pub mod types;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{Message, MessageType};
pub use registry::Registry;
pub use room::Room;
pub use router::{Outbound, Router, DEFAULT_ROOM};
pub use server::ChatServer;
pub use session::{Session, SessionRef};
pub use shutdown::Shutdown;
pub use types::SessionId;
