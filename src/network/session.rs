//! One inbound connection: read a command, acknowledge it, run it, complete it.
//!
//! ```text
//! Accepted -> CommandRead -> Dispatched -> AckSent (1..n) -> Completed -> Closed
//! ```
//!
//! Replies are written by a dedicated writer task fed through a channel, so handlers and ISS
//! relay tasks can acknowledge concurrently while the session itself is busy. The writer stops
//! after the DONE, which makes "exactly one completion" hold even if an abandoned relay task
//! tries to forward a late acknowledgement.

use super::protocol::{
    encode_line, parse_request, Acknowledgement, Completion, InboundCommand, RejectedRequest,
    Reply,
};
use crate::abort::AbortFlag;
use crate::app::Liric;
use crate::error::ErrorSite;
use crate::handlers::{CommandHandler, HandlerContext};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Sends acknowledgements for one inbound command.
#[derive(Debug, Clone)]
pub struct Acknowledger {
    id: String,
    tx: mpsc::UnboundedSender<Reply>,
    acknowledge_time: Arc<AtomicU64>,
    acknowledged: Arc<AtomicBool>,
}

impl Acknowledger {
    fn new(id: &str, tx: mpsc::UnboundedSender<Reply>) -> Self {
        Self {
            id: id.to_string(),
            tx,
            acknowledge_time: Arc::new(AtomicU64::new(0)),
            acknowledged: Arc::new(AtomicBool::new(false)),
        }
    }

    /// An acknowledger whose replies land in the returned receiver instead of a socket.
    pub fn channel(id: &str) -> (Self, mpsc::UnboundedReceiver<Reply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, tx), rx)
    }

    /// Id of the command being acknowledged.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sends an acknowledgement and records it as this command's acknowledge time.
    pub fn acknowledge(&self, time_to_complete: u64) {
        self.acknowledge_time
            .store(time_to_complete, Ordering::SeqCst);
        self.forward(time_to_complete);
    }

    /// Sends an acknowledgement without changing the recorded acknowledge time.
    pub fn forward(&self, time_to_complete: u64) {
        let reply = Reply::Acknowledge {
            id: self.id.clone(),
            acknowledgement: Acknowledgement { time_to_complete },
        };
        self.acknowledged.store(true, Ordering::SeqCst);
        if self.tx.send(reply).is_err() {
            debug!(id = %self.id, "Acknowledge after completion dropped");
        }
    }

    /// Whether any acknowledgement has been sent for this command.
    pub fn has_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst)
    }

    /// The last acknowledge time sent by the command itself.
    pub fn acknowledge_time(&self) -> u64 {
        self.acknowledge_time.load(Ordering::SeqCst)
    }

    fn complete(&self, completion: Completion) {
        let reply = Reply::Done {
            id: self.id.clone(),
            completion,
        };
        if self.tx.send(reply).is_err() {
            error!(id = %self.id, "Reply writer gone before completion was sent");
        }
    }
}

/// Resolves once a connection has written its completion and closed.
#[derive(Debug, Clone)]
pub struct ConnectionClosed(watch::Receiver<bool>);

impl ConnectionClosed {
    /// A pair whose sender reports the close.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    /// Resolves once the connection has closed.
    pub async fn wait(mut self) {
        // A dropped sender also means the connection is gone.
        let _ = self.0.wait_for(|closed| *closed).await;
    }
}

/// Serves exactly one command on one accepted socket.
pub struct ConnectionSession {
    liric: Arc<Liric>,
    peer: SocketAddr,
    session_id: String,
}

impl ConnectionSession {
    /// Session for a client at `peer`, with a fresh session id.
    pub fn new(liric: Arc<Liric>, peer: SocketAddr) -> Self {
        Self {
            liric,
            peer,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Runs the connection to completion, then closes it.
    #[instrument(skip_all, fields(peer = %self.peer, session = %self.session_id))]
    pub async fn run(self, socket: TcpStream) {
        info!("Client connected");
        let (read_half, write_half) = socket.into_split();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_replies(write_half, reply_rx));
        let (closed_tx, closed) = ConnectionClosed::channel();

        let settings = self.liric.settings();
        let read_timeout = settings
            .server_connection
            .command_read_timeout_ms
            .map(Duration::from_millis);
        let min_ack = settings.server_connection.min_acknowledge_time;

        let line = read_command_line(BufReader::new(read_half), read_timeout).await;
        let parsed = match line {
            Ok(line) => parse_request(&line),
            Err(message) => Err(RejectedRequest {
                id: "unknown".to_string(),
                site: ErrorSite::CommandMalformed,
                message,
            }),
        };

        match parsed {
            Ok(inbound) => {
                let acknowledger = Acknowledger::new(&inbound.id, reply_tx);
                self.dispatch(inbound, acknowledger, closed, min_ack).await;
            }
            Err(rejected) => {
                warn!(id = %rejected.id, error = %rejected.message, "Rejected command");
                let acknowledger = Acknowledger::new(&rejected.id, reply_tx);
                acknowledger.acknowledge(min_ack);
                acknowledger.complete(Completion::failure(rejected.site, rejected.message));
            }
        }

        if let Err(e) = writer.await {
            error!("Reply writer failed: {e}");
        }
        closed_tx.send_replace(true);
        info!("Client session closed");
    }

    async fn dispatch(
        &self,
        inbound: InboundCommand,
        acknowledger: Acknowledger,
        closed: ConnectionClosed,
        min_ack: u64,
    ) {
        let kind = inbound.command.kind();
        let type_name = inbound.command.type_name().to_string();
        let abort = AbortFlag::new();
        let status = Arc::clone(self.liric.status());

        if inbound.command.is_interrupt() {
            debug!(command = %type_name, "Interrupt-class command");
        }
        let current_guard = match kind {
            Some(kind) if !kind.is_interrupt() => {
                Some(status.begin_command(&inbound.id, kind, abort.clone()))
            }
            _ => None,
        };

        let handler = self.liric.registry().get(kind);
        let ctx = HandlerContext::new(Arc::clone(&self.liric), acknowledger.clone(), abort, closed);
        info!(id = %inbound.id, command = %type_name, "Dispatching command");
        let completion = run_guarded(handler, ctx, inbound.clone(), min_ack).await;

        info!(
            id = %inbound.id,
            command = %type_name,
            successful = completion.successful,
            error_num = completion.error_num,
            "Command completed"
        );
        drop(current_guard);
        acknowledger.complete(completion);
    }
}

/// Runs the handler in its own task. A panic at any stage still ends in at least one
/// acknowledgement and a +102 completion.
async fn run_guarded(
    handler: Box<dyn CommandHandler>,
    ctx: HandlerContext,
    command: InboundCommand,
    min_ack: u64,
) -> Completion {
    let acknowledger = ctx.acknowledger.clone();
    let type_name = command.command.type_name().to_string();
    let task_type = type_name.clone();
    let task = tokio::spawn(async move {
        run_handler(handler, &ctx, &command, &task_type, min_ack).await
    });
    match task.await {
        Ok(completion) => completion,
        Err(e) => {
            error!(command = %type_name, "Handler did not return: {e}");
            if !acknowledger.has_acknowledged() {
                acknowledger.acknowledge(min_ack);
            }
            Completion::failure(
                ErrorSite::ProcessCommand,
                format!("{type_name}:processCommand failed:{e}"),
            )
        }
    }
}

/// Init, acknowledge, process. Init and acknowledge failures are acknowledged with `min_ack`.
async fn run_handler(
    mut handler: Box<dyn CommandHandler>,
    ctx: &HandlerContext,
    command: &InboundCommand,
    type_name: &str,
    min_ack: u64,
) -> Completion {
    if let Err(e) = handler.init(ctx, command).await {
        error!(command = %type_name, "Handler init failed: {e}");
        ctx.acknowledger.acknowledge(min_ack);
        return Completion::failure(
            ErrorSite::ProcessCommand,
            format!("{type_name}:init failed:{e}"),
        );
    }
    match handler.calculate_acknowledge_time(ctx, command) {
        Ok(time_to_complete) => ctx.acknowledger.acknowledge(time_to_complete),
        Err(e) => {
            error!(command = %type_name, "Acknowledge time calculation failed: {e}");
            ctx.acknowledger.acknowledge(min_ack);
            return Completion::failure(
                ErrorSite::ProcessCommand,
                format!("{type_name}:calculateAcknowledgeTime failed:{e}"),
            );
        }
    }
    handler.process_command(ctx, command).await
}

async fn read_command_line(
    mut reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    read_timeout: Option<Duration>,
) -> Result<String, String> {
    let mut line = String::new();
    let read = match read_timeout {
        Some(limit) => timeout(limit, reader.read_line(&mut line))
            .await
            .map_err(|_| format!("No command received within {} ms", limit.as_millis()))?,
        None => reader.read_line(&mut line).await,
    };
    match read {
        Ok(0) => Err("Connection closed before a command was received".to_string()),
        Ok(_) => Ok(line),
        Err(e) => Err(format!("Failed to read command: {e}")),
    }
}

/// Writes replies in order until the completion has been written.
async fn write_replies(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Reply>) {
    while let Some(reply) = rx.recv().await {
        let is_done = matches!(reply, Reply::Done { .. });
        let line = match encode_line(&reply) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode reply: {e}");
                continue;
            }
        };
        if let Err(e) = write_half.write_all(line.as_bytes()).await {
            warn!("Failed to write reply: {e}");
            break;
        }
        if is_done {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}
