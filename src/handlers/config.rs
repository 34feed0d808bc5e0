//! CONFIG: filter, nudgematic offset size and coadd length, then the telescope focus offset.

use super::{finish, wrong_command, CommandHandler, HandlerContext};
use crate::config::parse_property;
use crate::error::{AppResult, ErrorSite};
use crate::network::protocol::{
    Command, CommandKind, Completion, InboundCommand, InstrumentConfig, IssCommand,
};
use async_trait::async_trait;
use tracing::{error, info, warn};

/// CONFIG handler.
#[derive(Debug, Default)]
pub struct ConfigHandler;

impl ConfigHandler {
    async fn send_config(ctx: &HandlerContext, config: &InstrumentConfig) -> AppResult<()> {
        ctx.c_layer.config_filter(&config.filter_name).await?;
        ctx.c_layer
            .config_nudgematic(config.nudgematic_offset_size)
            .await?;
        ctx.c_layer
            .config_coadd_exposure_length(config.coadd_exposure_length)
            .await
    }
}

#[async_trait]
impl CommandHandler for ConfigHandler {
    fn implements(&self) -> Option<CommandKind> {
        Some(CommandKind::Config)
    }

    /// `config.acknowledge_time`, or the default if that is missing or malformed.
    fn calculate_acknowledge_time(
        &self,
        ctx: &HandlerContext,
        _command: &InboundCommand,
    ) -> AppResult<u64> {
        let configured = parse_property::<u64>(
            "config.acknowledge_time",
            ctx.settings.config.acknowledge_time.as_deref(),
        );
        Ok(configured.unwrap_or_else(|e| {
            warn!("CONFIG acknowledge time: {e}");
            ctx.default_acknowledge_time()
        }))
    }

    async fn process_command(&self, ctx: &HandlerContext, command: &InboundCommand) -> Completion {
        let Command::Config { config } = &command.command else {
            return wrong_command(CommandKind::Config, &command.command);
        };

        let steps = async {
            ctx.checkpoint(command)?;
            let value = config.as_ref().ok_or_else(|| {
                error!(id = %command.id, "Config was null");
                Completion::failure(ErrorSite::ConfigMissing, ":Config was null.")
            })?;
            let config = serde_json::from_value::<InstrumentConfig>(value.clone()).map_err(|e| {
                error!(id = %command.id, "Config has wrong shape: {e}");
                Completion::failure(
                    ErrorSite::ConfigWrongShape,
                    format!(":Config has wrong class:{e}"),
                )
            })?;
            ctx.checkpoint(command)?;

            info!(
                id = %config.id,
                filter = %config.filter_name,
                nudgematic_offset_size = %config.nudgematic_offset_size,
                coadd_exposure_length = config.coadd_exposure_length,
                "Configuring"
            );
            Self::send_config(ctx, &config).await.map_err(|e| {
                error!("CONFIG: {e}");
                Completion::failure(ErrorSite::ConfigDownstream, e.to_string())
            })?;
            ctx.checkpoint(command)?;

            let focus_offset: f32 =
                parse_property("focus.offset", ctx.settings.focus.offset.as_deref()).map_err(
                    |e| {
                        error!("CONFIG: {e}");
                        Completion::failure(ErrorSite::ConfigFocusProperty, e.to_string())
                    },
                )?;
            let done = ctx
                .iss
                .send(
                    IssCommand::OffsetFocus { focus_offset },
                    &ctx.acknowledger,
                    &ctx.abort,
                )
                .await;
            if !done.successful {
                error!(focus_offset, "focusOffset failed: {}", done.error_string);
                return Err(Completion::failure(
                    ErrorSite::ConfigFocusOffset,
                    done.error_string,
                ));
            }

            let config_id = ctx
                .status()
                .increment_config_id(ctx.settings.status.config_id_file.as_deref())
                .await
                .map_err(|e| {
                    error!("Incrementing configuration ID: {e}");
                    Completion::failure(
                        ErrorSite::ConfigIdIncrement,
                        format!("Incrementing configuration ID:{e}"),
                    )
                })?;
            ctx.status().set_config_name(&config.id);
            ctx.status()
                .set_coadd_exposure_length(config.coadd_exposure_length);
            info!(config_id, name = %config.id, "Configuration applied");
            Ok::<_, Completion>(Completion::success(None))
        };
        finish(steps.await)
    }
}
