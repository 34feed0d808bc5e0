//! Fallback for command types with no registered handler.

use super::{CommandHandler, HandlerContext};
use crate::error::{AppResult, ErrorSite};
use crate::network::protocol::{CommandKind, Completion, InboundCommand};
use async_trait::async_trait;
use tracing::error;

/// Handler for every type without a registration.
#[derive(Debug, Default)]
pub struct UnknownHandler;

#[async_trait]
impl CommandHandler for UnknownHandler {
    fn implements(&self) -> Option<CommandKind> {
        None
    }

    fn calculate_acknowledge_time(
        &self,
        ctx: &HandlerContext,
        _command: &InboundCommand,
    ) -> AppResult<u64> {
        Ok(ctx.min_acknowledge_time())
    }

    async fn process_command(&self, _ctx: &HandlerContext, command: &InboundCommand) -> Completion {
        let message = format!("Unknown Command:{}", command.command.type_name());
        error!(id = %command.id, "{message}");
        Completion::failure(ErrorSite::UnknownCommand, message)
    }
}
