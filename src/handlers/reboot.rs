//! REBOOT: reload, restart, reboot or power off, each level gated by configuration.
//!
//! Levels that end the process close the server and hand the exit to
//! [`crate::app::Liric::quit_after`], which waits for this connection to send its completion.

use super::{wrong_command, CommandHandler, HandlerContext};
use crate::error::{AppResult, ErrorSite, LiricError};
use crate::line_protocol::LineCommandClient;
use crate::network::protocol::{Command, CommandKind, Completion, InboundCommand};
use async_trait::async_trait;
use std::fmt;
use tracing::{error, info, warn};

/// Acknowledge time used when a level has none configured.
pub const DEFAULT_REBOOT_ACKNOWLEDGE_TIME_MS: u64 = 300_000;

/// Exit code asking the autobooter to start the front end again.
pub const EXIT_RESTART: i32 = 0;
/// Exit code asking the autobooter to leave the front end stopped.
pub const EXIT_NO_RESTART: i32 = 127;

/// Legal REBOOT levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootLevel {
    /// 1: reload settings.
    Redatum,
    /// 2: restart the front end and C layer.
    Software,
    /// 3: reboot the machine.
    Hardware,
    /// 4: power the machine off.
    PowerOff,
}

impl RebootLevel {
    /// Level 0 (`NONE`) and anything above 4 are illegal.
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(RebootLevel::Redatum),
            2 => Some(RebootLevel::Software),
            3 => Some(RebootLevel::Hardware),
            4 => Some(RebootLevel::PowerOff),
            _ => None,
        }
    }

    /// Key used under `[reboot.enable]` and `[reboot.acknowledge_time]`.
    pub fn config_key(self) -> &'static str {
        match self {
            RebootLevel::Redatum => "redatum",
            RebootLevel::Software => "software",
            RebootLevel::Hardware => "hardware",
            RebootLevel::PowerOff => "power_off",
        }
    }
}

impl fmt::Display for RebootLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.config_key().to_uppercase())
    }
}

/// REBOOT handler.
#[derive(Debug, Default)]
pub struct RebootHandler;

impl RebootHandler {
    async fn reboot(ctx: &HandlerContext, level: RebootLevel) -> AppResult<()> {
        match level {
            RebootLevel::Redatum => ctx.liric.reinit().await,
            RebootLevel::Software => {
                ctx.c_layer.shutdown().await?;
                ctx.liric.close_server();
                ctx.liric.quit_after(ctx.closed.clone(), EXIT_RESTART);
                Ok(())
            }
            RebootLevel::Hardware | RebootLevel::PowerOff => {
                ctx.liric.close_server();
                ctx.liric.quit_after(ctx.closed.clone(), EXIT_NO_RESTART);
                let request = if level == RebootLevel::Hardware {
                    "reboot"
                } else {
                    "shutdown"
                };
                send_icsd(ctx, request).await
            }
        }
    }
}

/// Asks the OS helper daemon to reboot or shut the machine down.
async fn send_icsd(ctx: &HandlerContext, request: &str) -> AppResult<()> {
    let icsd = ctx.settings.icsd.as_ref().ok_or_else(|| {
        LiricError::Configuration("no [icsd] section configured".to_string())
    })?;
    info!(host = %icsd.hostname, request, "Sending request to icsd");
    LineCommandClient::new(icsd.hostname.clone(), icsd.port_number)
        .with_timeout(ctx.settings.c_layer_timeout())
        .send_ok(request)
        .await
        .map(|_| ())
}

#[async_trait]
impl CommandHandler for RebootHandler {
    fn implements(&self) -> Option<CommandKind> {
        Some(CommandKind::Reboot)
    }

    fn calculate_acknowledge_time(
        &self,
        ctx: &HandlerContext,
        command: &InboundCommand,
    ) -> AppResult<u64> {
        let level = match command.command {
            Command::Reboot { level } => RebootLevel::from_level(level),
            _ => None,
        };
        let configured = level
            .map(|level| ctx.settings.reboot_acknowledge_time(level.config_key()))
            .unwrap_or_else(|| {
                Err(LiricError::Configuration(
                    "illegal reboot level".to_string(),
                ))
            });
        Ok(configured.unwrap_or_else(|e| {
            warn!("REBOOT acknowledge time: {e}");
            DEFAULT_REBOOT_ACKNOWLEDGE_TIME_MS
        }))
    }

    async fn process_command(&self, ctx: &HandlerContext, command: &InboundCommand) -> Completion {
        let Command::Reboot { level: raw_level } = command.command else {
            return wrong_command(CommandKind::Reboot, &command.command);
        };
        let Some(level) = RebootLevel::from_level(raw_level) else {
            error!(level = raw_level, "Illegal reboot level");
            return Completion::failure(
                ErrorSite::RebootIllegalLevel,
                format!("Illegal level:{raw_level}"),
            );
        };
        if !ctx.settings.reboot_enabled(level.config_key()) {
            info!(%level, "Reboot level is not enabled");
            return Completion::success(None);
        }

        info!(%level, "Rebooting");
        match Self::reboot(ctx, level).await {
            Ok(()) => Completion::success(None),
            Err(e) => {
                error!(%level, "Reboot failed: {e}");
                Completion::failure(ErrorSite::RebootFailed, e.to_string())
            }
        }
    }
}
