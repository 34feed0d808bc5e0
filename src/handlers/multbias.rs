//! MULTBIAS: a series of bias frames.

use super::calibration::{acquire, Frames};
use super::{wrong_command, CommandHandler, HandlerContext};
use crate::error::{AppResult, ErrorSite};
use crate::network::protocol::{Command, CommandKind, Completion, InboundCommand};
use async_trait::async_trait;

const READOUT_ALLOWANCE_MS: u64 = 1000;

/// MULTBIAS handler.
#[derive(Debug, Default)]
pub struct MultbiasHandler;

#[async_trait]
impl CommandHandler for MultbiasHandler {
    fn implements(&self) -> Option<CommandKind> {
        Some(CommandKind::Multbias)
    }

    /// One second per frame on top of the default.
    fn calculate_acknowledge_time(
        &self,
        ctx: &HandlerContext,
        command: &InboundCommand,
    ) -> AppResult<u64> {
        let count = match command.command {
            Command::Multbias { number_exposures } => u64::from(number_exposures),
            _ => 0,
        };
        Ok(READOUT_ALLOWANCE_MS
            .saturating_mul(count)
            .saturating_add(ctx.default_acknowledge_time()))
    }

    async fn process_command(&self, ctx: &HandlerContext, command: &InboundCommand) -> Completion {
        match command.command {
            Command::Multbias { number_exposures } => {
                let frames = Frames::Bias {
                    count: number_exposures,
                };
                acquire(ctx, command, frames, ErrorSite::Multbias).await
            }
            ref other => wrong_command(CommandKind::Multbias, other),
        }
    }
}
