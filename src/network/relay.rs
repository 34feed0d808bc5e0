//! Acknowledgement relay to the ISS.
//!
//! A sub-request (MOVE_FOLD, GET_FITS, OFFSET_FOCUS) runs as its own task. Every ACKNOWLEDGE
//! the ISS sends is passed straight to the inbound client so its receive timeout keeps being
//! extended, and the final DONE is followed by one more forward carrying the connection's own
//! acknowledge time. The connection waits in bounded slices so it can notice an abort; when it
//! gives up the relay task is left to finish on its own.

use super::protocol::{decode_reply, encode_line, Completion, IssCommand, IssRequest, Reply};
use super::session::Acknowledger;
use crate::abort::AbortFlag;
use crate::config::Settings;
use crate::error::{AppResult, ErrorSite, LiricError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Sends sub-requests to the ISS on behalf of one inbound command.
#[derive(Debug, Clone)]
pub struct IssRelay {
    address: String,
    port: u16,
    poll_interval: Duration,
}

impl IssRelay {
    /// Relay to `address:port`, checking for aborts every `poll_interval`.
    pub fn new(address: impl Into<String>, port: u16, poll_interval: Duration) -> Self {
        Self {
            address: address.into(),
            port,
            poll_interval,
        }
    }

    /// Relay to `[iss]` using the configured abort poll interval.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.iss.address.clone(),
            settings.iss.port_number,
            settings.server_connection.abort_poll_interval(),
        )
    }

    /// Sends `command` to the ISS and returns its completion.
    ///
    /// Never fails outright: if no DONE arrives, a failure completion is synthesized with
    /// [`ErrorSite::RelayAborted`] when an abort was requested, else
    /// [`ErrorSite::RelayNoCompletion`].
    #[instrument(skip_all, fields(iss_command = command.name()))]
    pub async fn send(
        &self,
        command: IssCommand,
        acknowledger: &Acknowledger,
        abort: &AbortFlag,
    ) -> Completion {
        let request = IssRequest {
            id: Uuid::new_v4().to_string(),
            command,
        };
        let peer = format!("{}:{}", self.address, self.port);
        let mut exchange = tokio::spawn(relay_exchange(
            peer.clone(),
            request,
            acknowledger.clone(),
        ));

        let outcome = loop {
            match timeout(self.poll_interval, &mut exchange).await {
                Ok(joined) => break joined,
                Err(_) if abort.is_requested() => {
                    warn!(%peer, "Abort requested while waiting for ISS, no longer waiting");
                    break Ok(Err(LiricError::Aborted("ISS relay".to_string())));
                }
                Err(_) => continue,
            }
        };

        match outcome {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => no_completion(abort, &e.to_string()),
            Err(join_error) => no_completion(abort, &join_error.to_string()),
        }
    }
}

fn no_completion(abort: &AbortFlag, reason: &str) -> Completion {
    if abort.is_requested() {
        Completion::failure(
            ErrorSite::RelayAborted,
            format!("sendISSCommand:Server thread Aborted:{reason}"),
        )
    } else {
        error!(reason, "ISS exchange produced no completion");
        Completion::failure(
            ErrorSite::RelayNoCompletion,
            format!("sendISSCommand:Getting Done failed:{reason}"),
        )
    }
}

async fn relay_exchange(
    peer: String,
    request: IssRequest,
    acknowledger: Acknowledger,
) -> AppResult<Completion> {
    let network = |source: std::io::Error| LiricError::Network {
        peer: peer.clone(),
        source,
    };

    let stream = TcpStream::connect(&peer).await.map_err(network)?;
    let (read_half, mut write_half) = stream.into_split();
    write_half
        .write_all(encode_line(&request)?.as_bytes())
        .await
        .map_err(network)?;
    write_half.flush().await.map_err(network)?;
    debug!(id = %request.id, command = request.command.name(), "Sent ISS request");

    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await.map_err(network)? {
        if line.trim().is_empty() {
            continue;
        }
        match decode_reply(&line)? {
            Reply::Acknowledge {
                acknowledgement, ..
            } => {
                debug!(
                    time_to_complete = acknowledgement.time_to_complete,
                    "Forwarding ISS acknowledge"
                );
                acknowledger.forward(acknowledgement.time_to_complete);
            }
            Reply::Done { completion, .. } => {
                info!(
                    successful = completion.successful,
                    error_num = completion.error_num,
                    "ISS request done"
                );
                acknowledger.forward(acknowledger.acknowledge_time());
                return Ok(completion);
            }
        }
    }

    Err(network(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "ISS closed the connection before DONE",
    )))
}
