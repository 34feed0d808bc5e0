//! ABORT: stop the detector, then flag the running command.

use super::{CommandHandler, HandlerContext};
use crate::error::{AppResult, ErrorSite};
use crate::network::protocol::{CommandKind, Completion, InboundCommand};
use async_trait::async_trait;
use tracing::{error, info};

/// ABORT handler.
#[derive(Debug, Default)]
pub struct AbortHandler;

#[async_trait]
impl CommandHandler for AbortHandler {
    fn implements(&self) -> Option<CommandKind> {
        Some(CommandKind::Abort)
    }

    fn calculate_acknowledge_time(
        &self,
        ctx: &HandlerContext,
        _command: &InboundCommand,
    ) -> AppResult<u64> {
        Ok(ctx.default_acknowledge_time())
    }

    async fn process_command(&self, ctx: &HandlerContext, _command: &InboundCommand) -> Completion {
        if let Err(e) = ctx.c_layer.abort().await {
            error!("Aborting exposure failed: {e}");
            return Completion::failure(ErrorSite::Abort, e.to_string());
        }
        match ctx.status().current_command() {
            Some(current) => {
                info!(id = %current.id, command = %current.kind, "Aborting current command");
                current.request_abort();
            }
            None => info!("No current command to abort"),
        }
        Completion::success(None)
    }
}
