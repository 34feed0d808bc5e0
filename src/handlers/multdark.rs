//! MULTDARK: a series of dark frames.

use super::calibration::{acquire, Frames};
use super::{wrong_command, CommandHandler, HandlerContext};
use crate::error::{AppResult, ErrorSite};
use crate::network::protocol::{Command, CommandKind, Completion, InboundCommand};
use async_trait::async_trait;

/// MULTDARK handler.
#[derive(Debug, Default)]
pub struct MultdarkHandler;

#[async_trait]
impl CommandHandler for MultdarkHandler {
    fn implements(&self) -> Option<CommandKind> {
        Some(CommandKind::Multdark)
    }

    fn calculate_acknowledge_time(
        &self,
        ctx: &HandlerContext,
        command: &InboundCommand,
    ) -> AppResult<u64> {
        let total = match command.command {
            Command::Multdark {
                exposure_time,
                number_exposures,
            } => u64::from(exposure_time).saturating_mul(u64::from(number_exposures)),
            _ => 0,
        };
        Ok(total.saturating_add(ctx.default_acknowledge_time()))
    }

    async fn process_command(&self, ctx: &HandlerContext, command: &InboundCommand) -> Completion {
        match command.command {
            Command::Multdark {
                exposure_time,
                number_exposures,
            } => {
                let frames = Frames::Dark {
                    length_ms: exposure_time,
                    count: number_exposures,
                };
                acquire(ctx, command, frames, ErrorSite::Multdark).await
            }
            ref other => wrong_command(CommandKind::Multdark, other),
        }
    }
}
