//! BIAS: one bias frame, fold left where it is.

use super::calibration::{acquire, Frames};
use super::{wrong_command, CommandHandler, HandlerContext};
use crate::error::{AppResult, ErrorSite};
use crate::network::protocol::{Command, CommandKind, Completion, InboundCommand};
use async_trait::async_trait;

const READOUT_ALLOWANCE_MS: u64 = 1000;

/// BIAS handler.
#[derive(Debug, Default)]
pub struct BiasHandler;

#[async_trait]
impl CommandHandler for BiasHandler {
    fn implements(&self) -> Option<CommandKind> {
        Some(CommandKind::Bias)
    }

    fn calculate_acknowledge_time(
        &self,
        ctx: &HandlerContext,
        _command: &InboundCommand,
    ) -> AppResult<u64> {
        Ok(READOUT_ALLOWANCE_MS.saturating_add(ctx.default_acknowledge_time()))
    }

    async fn process_command(&self, ctx: &HandlerContext, command: &InboundCommand) -> Completion {
        match command.command {
            Command::Bias => {
                acquire(ctx, command, Frames::Bias { count: 1 }, ErrorSite::Bias).await
            }
            ref other => wrong_command(CommandKind::Bias, other),
        }
    }
}
