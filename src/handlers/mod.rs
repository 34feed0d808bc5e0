//! Command handlers.
//!
//! Each inbound command type is served by a fresh [`CommandHandler`] created through the
//! [`crate::registry::CommandRegistry`]. Handlers share behaviour by composition: the fold
//! mover ([`fold`]), the FITS header assembler ([`fits`]) and the exposure reply parser with
//! the bias/dark calls ([`calibration`]) are plain helpers any handler can call.
//!
//! Handlers never return errors from `process_command`. Every failure becomes a [`Completion`]
//! carrying the [`ErrorSite`] code of the step that failed.

use crate::abort::AbortFlag;
use crate::app::Liric;
use crate::config::Settings;
use crate::error::{AppResult, ErrorSite, LIRIC_ERROR_CODE_NO_ERROR};
use crate::line_protocol::CLayer;
use crate::network::protocol::{Command, CommandKind, Completion, InboundCommand};
use crate::network::relay::IssRelay;
use crate::network::session::{Acknowledger, ConnectionClosed};
use crate::status::LiricStatus;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

pub mod abort;
pub mod bias;
pub mod calibration;
pub mod config;
pub mod dark;
pub mod fits;
pub mod fold;
pub mod get_status;
pub mod multbias;
pub mod multdark;
pub mod multrun;
pub mod reboot;
pub mod unknown;

/// Acknowledge time used by handlers that do not override it.
pub const GENERIC_ACKNOWLEDGE_TIME_MS: u64 = 1000;

/// Everything a handler can reach while serving one command.
pub struct HandlerContext {
    /// The coordinator.
    pub liric: Arc<Liric>,
    /// Settings as they were when the command arrived.
    pub settings: Arc<Settings>,
    /// Downstream C layer.
    pub c_layer: CLayer,
    /// ISS relay for sub-requests.
    pub iss: IssRelay,
    /// Acknowledges on the inbound connection.
    pub acknowledger: Acknowledger,
    /// Set when another connection aborts this command.
    pub abort: AbortFlag,
    /// Resolves once the inbound connection has closed.
    pub closed: ConnectionClosed,
}

impl HandlerContext {
    /// Context for one command, taking a settings snapshot from `liric`.
    pub fn new(
        liric: Arc<Liric>,
        acknowledger: Acknowledger,
        abort: AbortFlag,
        closed: ConnectionClosed,
    ) -> Self {
        let settings = liric.settings();
        Self {
            c_layer: CLayer::from_settings(&settings),
            iss: IssRelay::from_settings(&settings),
            liric,
            settings,
            acknowledger,
            abort,
            closed,
        }
    }

    /// Process status.
    pub fn status(&self) -> &Arc<LiricStatus> {
        self.liric.status()
    }

    /// `[server_connection] default_acknowledge_time`
    pub fn default_acknowledge_time(&self) -> u64 {
        self.settings.server_connection.default_acknowledge_time
    }

    /// `[server_connection] min_acknowledge_time`
    pub fn min_acknowledge_time(&self) -> u64 {
        self.settings.server_connection.min_acknowledge_time
    }

    /// Abort checkpoint: fails with [`ErrorSite::AbortCheckpoint`] once an abort was requested.
    pub fn checkpoint(&self, command: &InboundCommand) -> Result<(), Completion> {
        if self.abort.is_requested() {
            let message = format!("Command {} Operation Aborted.", command.command.type_name());
            error!(id = %command.id, "{message}");
            return Err(Completion::failure(ErrorSite::AbortCheckpoint, message));
        }
        Ok(())
    }
}

/// A handler for one command type.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The command type this handler serves, `None` for the fallback handler.
    fn implements(&self) -> Option<CommandKind>;

    /// Per-command setup before the acknowledge time is computed.
    async fn init(&mut self, _ctx: &HandlerContext, _command: &InboundCommand) -> AppResult<()> {
        Ok(())
    }

    /// Milliseconds the client should wait for the completion.
    fn calculate_acknowledge_time(
        &self,
        _ctx: &HandlerContext,
        _command: &InboundCommand,
    ) -> AppResult<u64> {
        Ok(GENERIC_ACKNOWLEDGE_TIME_MS)
    }

    /// Does the work. Every failure is returned as a completion, never raised.
    async fn process_command(&self, _ctx: &HandlerContext, _command: &InboundCommand) -> Completion {
        Completion {
            successful: true,
            error_num: LIRIC_ERROR_CODE_NO_ERROR,
            error_string: "Generic Command Implementation.".to_string(),
            result: None,
        }
    }
}

/// Failure for a handler given a command of the wrong type.
pub(crate) fn wrong_command(expected: CommandKind, command: &Command) -> Completion {
    Completion::failure(
        ErrorSite::ProcessCommand,
        format!(
            "{expected} handler cannot process a {} command",
            command.type_name()
        ),
    )
}

/// Collapses a step-by-step result where early exits already carry their completion.
pub(crate) fn finish(result: Result<Completion, Completion>) -> Completion {
    result.unwrap_or_else(|completion| completion)
}
