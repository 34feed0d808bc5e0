//! Accept loop for inbound command connections.
//!
//! Every accepted socket gets its own [`ConnectionSession`] task. The loop ends when the
//! coordinator closes the server; sessions already running are left to finish.

use super::session::ConnectionSession;
use crate::app::Liric;
use crate::error::{AppResult, LiricError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Accepts client connections and runs one [`ConnectionSession`] per socket.
pub struct CommandServer {
    listener: TcpListener,
    liric: Arc<Liric>,
}

impl CommandServer {
    /// Binds to `[server] address` and `port`.
    pub async fn bind(liric: Arc<Liric>) -> AppResult<Self> {
        let settings = liric.settings();
        let address = format!("{}:{}", settings.server.address, settings.server.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| LiricError::Network {
                peer: address.clone(),
                source,
            })?;
        info!(%address, "Command server listening");
        Ok(Self { listener, liric })
    }

    /// Bound address, useful when `[server] port` is 0.
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts until the coordinator closes the server. Sessions already running finish on their own.
    pub async fn run(self) {
        let mut shutdown = self.liric.shutdown_signal();
        if *shutdown.borrow_and_update() {
            info!("Command server closed before accepting");
            return;
        }
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        let session = ConnectionSession::new(Arc::clone(&self.liric), peer);
                        tokio::spawn(session.run(socket));
                    }
                    Err(e) => error!("Accept error: {e}"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Command server closed");
                        break;
                    }
                }
            }
        }
    }
}
