//! Bias and dark frame acquisition and the exposure reply parser shared with MULTRUN.

use super::fits::FitsHeaderAssembler;
use super::HandlerContext;
use crate::error::{AppResult, ErrorSite, LiricError};
use crate::network::protocol::{CommandResult, Completion, InboundCommand};
use tracing::{debug, error, info};

/// The frames one calibration command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frames {
    /// `multbias count`
    Bias {
        /// Frames to read out.
        count: u32,
    },
    /// `multdark length_ms count`
    Dark {
        /// Milliseconds per frame.
        length_ms: u32,
        /// Frames to take.
        count: u32,
    },
}

/// What the C layer reports after a multrun, multbias or multdark.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExposureSummary {
    /// Files written.
    pub filename_count: i32,
    /// Multrun number used in the filenames.
    pub multrun_number: i32,
    /// Path of the last file written.
    pub last_filename: String,
}

/// Parses `<filename count> <multrun number> <last filename>`.
///
/// Tokens after the third are logged and ignored.
pub fn parse_exposure_reply(payload: &str) -> AppResult<ExposureSummary> {
    let mut tokens = payload.split_whitespace();
    let mut next = |what: &str| {
        tokens
            .next()
            .ok_or_else(|| LiricError::parse(payload, format!("missing {what}")))
    };
    let filename_count = next("filename count")?
        .parse::<i32>()
        .map_err(|e| LiricError::parse(payload, format!("bad filename count: {e}")))?;
    let multrun_number = next("multrun number")?
        .parse::<i32>()
        .map_err(|e| LiricError::parse(payload, format!("bad multrun number: {e}")))?;
    let last_filename = next("last filename")?.to_string();

    for (index, extra) in tokens.enumerate() {
        debug!(index = index + 3, token = extra, "Ignoring unknown exposure reply token");
    }
    Ok(ExposureSummary {
        filename_count,
        multrun_number,
        last_filename,
    })
}

/// Takes `count` bias frames.
pub async fn take_bias(ctx: &HandlerContext, count: u32) -> AppResult<ExposureSummary> {
    info!(count, "Starting multbias");
    let payload = ctx.c_layer.multbias(count).await?;
    parse_exposure_reply(&payload)
}

/// Takes `count` dark frames of `length_ms` each.
pub async fn take_dark(
    ctx: &HandlerContext,
    length_ms: u32,
    count: u32,
) -> AppResult<ExposureSummary> {
    info!(length_ms, count, "Starting multdark");
    let payload = ctx.c_layer.multdark(length_ms, count).await?;
    parse_exposure_reply(&payload)
}

/// Checkpoint, FITS headers, checkpoint, then the frames themselves.
///
/// A failed exposure call is reported with `site`; success carries the last filename written.
pub async fn acquire(
    ctx: &HandlerContext,
    command: &InboundCommand,
    frames: Frames,
    site: ErrorSite,
) -> Completion {
    let steps = async {
        ctx.checkpoint(command)?;
        FitsHeaderAssembler::new(ctx).assemble().await?;
        ctx.checkpoint(command)?;
        let taken = match frames {
            Frames::Bias { count } => take_bias(ctx, count).await,
            Frames::Dark { length_ms, count } => take_dark(ctx, length_ms, count).await,
        };
        let summary = taken.map_err(|e| {
            let name = command.command.type_name();
            error!(command = name, "Calibration exposure failed: {e}");
            Completion::failure(site, format!("{name}:processCommand:exposure failed:{e}"))
        })?;
        info!(
            filename = %summary.last_filename,
            count = summary.filename_count,
            "Calibration frames written"
        );
        Ok::<_, Completion>(Completion::success(Some(CommandResult::Calibration {
            filename: summary.last_filename,
        })))
    };
    super::finish(steps.await)
}
