//! DARK: one dark frame.

use super::calibration::{acquire, Frames};
use super::{wrong_command, CommandHandler, HandlerContext};
use crate::error::{AppResult, ErrorSite};
use crate::network::protocol::{Command, CommandKind, Completion, InboundCommand};
use async_trait::async_trait;

/// DARK handler.
#[derive(Debug, Default)]
pub struct DarkHandler;

#[async_trait]
impl CommandHandler for DarkHandler {
    fn implements(&self) -> Option<CommandKind> {
        Some(CommandKind::Dark)
    }

    fn calculate_acknowledge_time(
        &self,
        ctx: &HandlerContext,
        command: &InboundCommand,
    ) -> AppResult<u64> {
        let exposure_time = match command.command {
            Command::Dark { exposure_time } => u64::from(exposure_time),
            _ => 0,
        };
        Ok(exposure_time.saturating_add(ctx.default_acknowledge_time()))
    }

    async fn process_command(&self, ctx: &HandlerContext, command: &InboundCommand) -> Completion {
        match command.command {
            Command::Dark { exposure_time } => {
                let frames = Frames::Dark {
                    length_ms: exposure_time,
                    count: 1,
                };
                acquire(ctx, command, frames, ErrorSite::Dark).await
            }
            ref other => wrong_command(CommandKind::Dark, other),
        }
    }
}
