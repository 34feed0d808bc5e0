//! One-shot line exchanges with a downstream peer.

use super::reply::{FromReply, LineReply};
use crate::error::{AppResult, LiricError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Client for one line protocol peer.
///
/// Holds no connection between calls; every exchange opens a fresh socket.
///
/// ```no_run
/// # tokio_test::block_on(async {
/// use liric::line_protocol::LineCommandClient;
///
/// let client = LineCommandClient::new("localhost", 8367);
/// let count: i32 = client.query("status exposure count").await?;
/// println!("{count} exposures in this multrun");
/// # Ok::<(), liric::error::LiricError>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct LineCommandClient {
    host: String,
    port: u16,
    timeout: Option<Duration>,
}

impl LineCommandClient {
    /// Unbounded client for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: None,
        }
    }

    /// Bounds the whole exchange (connect, write, read).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `host:port`, for logs and errors.
    pub fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Sends `command` and returns the parsed reply, whatever its status.
    ///
    /// A command containing CR or LF is refused without connecting.
    #[instrument(skip(self), fields(peer = %self.peer()))]
    pub async fn send(&self, command: &str) -> AppResult<LineReply> {
        if command.contains(['\r', '\n']) {
            return Err(LiricError::MultiLineCommand(command.to_string()));
        }
        let raw = match self.timeout {
            Some(limit) => timeout(limit, self.exchange(command))
                .await
                .map_err(|_| LiricError::NetworkTimeout {
                    peer: self.peer(),
                    timeout_ms: limit.as_millis() as u64,
                })??,
            None => self.exchange(command).await?,
        };
        debug!(reply = %raw.trim_end(), "Received reply");
        LineReply::parse(&raw)
    }

    /// Sends `command` and fails unless the reply status is zero.
    pub async fn send_ok(&self, command: &str) -> AppResult<String> {
        self.send(command).await?.into_payload(command)
    }

    /// Sends `command` and converts the success payload into `T`.
    pub async fn query<T: FromReply>(&self, command: &str) -> AppResult<T> {
        self.send(command).await?.value(command)
    }

    async fn exchange(&self, command: &str) -> AppResult<String> {
        let peer = self.peer();
        let network = |source: std::io::Error| LiricError::Network {
            peer: peer.clone(),
            source,
        };

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(network)?;
        let (read_half, mut write_half) = stream.into_split();

        write_half
            .write_all(format!("{command}\n").as_bytes())
            .await
            .map_err(network)?;
        write_half.flush().await.map_err(network)?;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        let read = reader.read_line(&mut line).await.map_err(network)?;
        if read == 0 {
            return Err(LiricError::Network {
                peer,
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("connection closed before reply to '{command}'"),
                ),
            });
        }
        Ok(line)
    }
}
