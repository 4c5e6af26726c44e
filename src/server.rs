//! ChatServer accept loop
//!
//! Accepts TCP connections, performs the TLS handshake when configured, and
//! spawns one handler task per connection. The loop never waits on
//! per-connection I/O.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::registry::Registry;
use crate::router::Router;
use crate::shutdown::Shutdown;
use crate::tls;

/// Upper bound on a client's TLS handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The relay server
///
/// Owns the listener and the router shared by all connection tasks.
pub struct ChatServer {
    listener: TcpListener,
    router: Arc<Router>,
    tls: Option<TlsAcceptor>,
}

impl ChatServer {
    /// Create a plaintext server with a fresh registry and the default room
    pub fn new(listener: TcpListener) -> Self {
        Self::with_router(listener, Router::new(Arc::new(Registry::new())))
    }

    pub fn with_router(listener: TcpListener, router: Router) -> Self {
        Self {
            listener,
            router: Arc::new(router),
            tls: None,
        }
    }

    /// Require a TLS handshake on every accepted connection
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Bind and configure a server from `ServerConfig`
    pub async fn bind(config: &ServerConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let router = Router::with_default_room(Arc::new(Registry::new()), &config.default_room);
        let server = Self::with_router(listener, router);

        match &config.tls {
            Some(paths) => Ok(server.with_tls(tls::load_acceptor(&paths.cert, &paths.key)?)),
            None => {
                warn!("TLS is not configured; traffic is unencrypted");
                Ok(server)
            }
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(self.router.registry())
    }

    /// Accept connections until `shutdown` completes
    ///
    /// On shutdown the listener is closed and every connection task is
    /// signalled; each finishes its current message and cleans up on its own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send,
    {
        let ChatServer {
            listener,
            router,
            tls,
        } = self;
        let (trigger, signal) = crate::shutdown::channel();
        tokio::pin!(shutdown);

        info!(
            "ChatServer started (tls: {}, default room: {})",
            tls.is_some(),
            router.default_room()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("ChatServer shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("New connection from {}", addr);
                        spawn_connection(stream, addr, &router, tls.clone(), signal.clone());
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        drop(listener);
        trigger.trigger();
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<(), AppError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install ctrl-c handler: {}", e);
            }
        })
        .await
    }
}

fn spawn_connection(
    stream: TcpStream,
    addr: SocketAddr,
    router: &Arc<Router>,
    tls: Option<TlsAcceptor>,
    shutdown: Shutdown,
) {
    let router = Arc::clone(router);
    tokio::spawn(async move {
        let peer = addr.to_string();
        let result = match tls {
            Some(acceptor) => {
                match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                    Ok(Ok(stream)) => {
                        debug!("Handshake done with {}", addr);
                        handle_connection(stream, peer, router, shutdown).await
                    }
                    Ok(Err(e)) => {
                        warn!("TLS handshake with {} failed: {}", addr, e);
                        return;
                    }
                    Err(_) => {
                        warn!("TLS handshake with {} timed out", addr);
                        return;
                    }
                }
            }
            None => handle_connection(stream, peer, router, shutdown).await,
        };

        if let Err(e) = result {
            debug!("Connection handler for {} ended with error: {}", addr, e);
        }
    });
}
