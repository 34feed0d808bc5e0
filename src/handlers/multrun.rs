//! MULTRUN: a science exposure series.

use super::calibration::parse_exposure_reply;
use super::fits::FitsHeaderAssembler;
use super::fold::move_fold;
use super::{finish, wrong_command, CommandHandler, HandlerContext};
use crate::config::parse_property;
use crate::error::{AppResult, ErrorSite};
use crate::network::protocol::{
    Command, CommandKind, CommandResult, Completion, InboundCommand, MultrunResult,
};
use async_trait::async_trait;
use tracing::{debug, error, info};

/// Coadd length assumed when no CONFIG has set one yet.
const FALLBACK_COADD_LENGTH_MS: u64 = 100;

/// MULTRUN handler.
#[derive(Debug, Default)]
pub struct MultrunHandler;

/// Exposure time, coadd readouts and nudgematic moves for `count` exposures of `length_ms`.
///
/// Coadds per exposure are `length_ms / coadd_length_ms`, truncated. Saturates at `u64::MAX`.
pub fn multrun_duration(
    length_ms: u64,
    count: u64,
    coadd_length_ms: u64,
    coadd_readout_overhead: u64,
    nudgematic_overhead: u64,
) -> u64 {
    let coadd_length_ms = if coadd_length_ms == 0 {
        FALLBACK_COADD_LENGTH_MS
    } else {
        coadd_length_ms
    };
    let coadd_count = (length_ms / coadd_length_ms).saturating_mul(count);
    length_ms
        .saturating_mul(count)
        .saturating_add(coadd_readout_overhead.saturating_mul(coadd_count))
        .saturating_add(nudgematic_overhead.saturating_mul(count))
}

#[async_trait]
impl CommandHandler for MultrunHandler {
    fn implements(&self) -> Option<CommandKind> {
        Some(CommandKind::Multrun)
    }

    fn calculate_acknowledge_time(
        &self,
        ctx: &HandlerContext,
        command: &InboundCommand,
    ) -> AppResult<u64> {
        let Command::Multrun {
            exposure_time,
            number_exposures,
            ..
        } = command.command
        else {
            return Ok(ctx.default_acknowledge_time());
        };
        let coadd_readout_overhead: u64 = parse_property(
            "coadd.readout_overhead",
            ctx.settings.coadd.readout_overhead.as_deref(),
        )?;
        let nudgematic_overhead: u64 = parse_property(
            "nudgematic.overhead",
            ctx.settings.nudgematic.overhead.as_deref(),
        )?;
        let coadd_length_ms = u64::from(ctx.status().coadd_exposure_length());
        let duration = multrun_duration(
            u64::from(exposure_time),
            u64::from(number_exposures),
            coadd_length_ms,
            coadd_readout_overhead,
            nudgematic_overhead,
        );
        debug!(
            exposure_time,
            number_exposures,
            coadd_length_ms,
            coadd_readout_overhead,
            nudgematic_overhead,
            duration,
            "Multrun acknowledge time"
        );
        Ok(duration.saturating_add(ctx.default_acknowledge_time()))
    }

    async fn process_command(&self, ctx: &HandlerContext, command: &InboundCommand) -> Completion {
        let Command::Multrun {
            exposure_time,
            number_exposures,
            standard,
        } = command.command
        else {
            return wrong_command(CommandKind::Multrun, &command.command);
        };

        let steps = async {
            ctx.checkpoint(command)?;
            move_fold(ctx).await?;
            ctx.checkpoint(command)?;
            FitsHeaderAssembler::new(ctx).assemble().await?;
            ctx.checkpoint(command)?;

            info!(exposure_time, number_exposures, standard, "Starting multrun");
            let summary = async {
                let payload = ctx
                    .c_layer
                    .multrun(exposure_time, number_exposures, standard)
                    .await?;
                parse_exposure_reply(&payload)
            }
            .await
            .map_err(|e| {
                error!("sendMultrunCommand failed: {e}");
                Completion::failure(
                    ErrorSite::Multrun,
                    format!("MULTRUN:processCommand:sendMultrunCommand failed:{e}"),
                )
            })?;

            info!(
                filename = %summary.last_filename,
                multrun = summary.multrun_number,
                "Multrun finished"
            );
            Ok::<_, Completion>(Completion::success(Some(CommandResult::Multrun(
                MultrunResult {
                    filename: summary.last_filename,
                    ..MultrunResult::default()
                },
            ))))
        };
        finish(steps.await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{context, iss_done, settings_toml, FakeCLayer, FakeIss};

    const OVERHEADS: &str = r#"
        [coadd]
        readout_overhead = "20"

        [nudgematic]
        overhead = "1500"
    "#;

    fn multrun(exposure_time: u32, number_exposures: u32) -> InboundCommand {
        InboundCommand::new(
            "mr",
            Command::Multrun {
                exposure_time,
                number_exposures,
                standard: false,
            },
        )
    }

    #[test]
    fn duration_counts_truncated_coadds() {
        // 10 s in 1 s coadds, 3 exposures: 30 coadds.
        assert_eq!(multrun_duration(10_000, 3, 1000, 20, 1500), 30_000 + 600 + 4500);
        // 250 ms in 100 ms coadds rounds down to 2 per exposure.
        assert_eq!(multrun_duration(250, 2, 100, 10, 0), 500 + 40);
        // No coadd length yet falls back to 100 ms.
        assert_eq!(multrun_duration(1000, 1, 0, 1, 0), 1000 + 10);
        // 1 s in 100 ms coadds, 3 exposures, 50 ms per readout, 20 ms per nudgematic move.
        assert_eq!(multrun_duration(1000, 3, 100, 50, 20), 4560);
    }

    #[test]
    fn duration_saturates_on_largest_request() {
        let max = u64::from(u32::MAX);
        assert_eq!(multrun_duration(max, max, 100, 20, 1500), u64::MAX);
    }

    #[tokio::test]
    async fn acknowledge_time_uses_config_coadd_length() {
        let test = context(settings_toml(1, 1, OVERHEADS));
        test.ctx.status().set_coadd_exposure_length(1000);
        let ack = MultrunHandler
            .calculate_acknowledge_time(&test.ctx, &multrun(10_000, 3))
            .unwrap();
        assert_eq!(ack, 35_100 + 60_000);
    }

    #[tokio::test]
    async fn missing_overhead_fails_acknowledge() {
        let test = context(settings_toml(1, 1, ""));
        assert!(MultrunHandler
            .calculate_acknowledge_time(&test.ctx, &multrun(1000, 1))
            .is_err());
    }

    #[tokio::test]
    async fn multrun_moves_fold_then_exposes() {
        let c_layer = FakeCLayer::start(vec![("multrun", "0 2 15 h_e_20240101_15_2_1_0.fits")]).await;
        let iss = FakeIss::start(vec![
            iss_done(Completion::success(None)),
            iss_done(Completion::success(None)),
        ])
        .await;
        let mut settings = settings_toml(c_layer.port, iss.port, OVERHEADS);
        settings.mirror_fold_position = Some("2".to_string());
        let test = context(settings);

        let done = MultrunHandler
            .process_command(&test.ctx, &multrun(5000, 2))
            .await;
        assert!(done.successful, "{}", done.error_string);
        let Some(CommandResult::Multrun(result)) = done.result else {
            panic!("expected a multrun result");
        };
        assert_eq!(result.filename, "h_e_20240101_15_2_1_0.fits");
        assert!(!result.saturation);

        let requests = iss.requests();
        assert_eq!(requests[0]["command"]["type"], "MOVE_FOLD");
        assert_eq!(requests[0]["command"]["mirror_position"], 2);
        assert_eq!(requests[1]["command"]["type"], "GET_FITS");
        assert_eq!(c_layer.received().last().unwrap(), "multrun 5000 2 false");
    }

    #[tokio::test]
    async fn rejected_multrun_has_multrun_code() {
        let c_layer = FakeCLayer::start(vec![("multrun", "1 not configured")]).await;
        let iss = FakeIss::start(vec![
            iss_done(Completion::success(None)),
            iss_done(Completion::success(None)),
        ])
        .await;
        let mut settings = settings_toml(c_layer.port, iss.port, "");
        settings.mirror_fold_position = Some("2".to_string());
        let test = context(settings);
        let done = MultrunHandler
            .process_command(&test.ctx, &multrun(1000, 1))
            .await;
        assert_eq!(done.error_num, ErrorSite::Multrun.code());
        assert!(done.error_string.contains("not configured"));
    }
}
