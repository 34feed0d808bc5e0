//! Fold mirror positioning through the ISS.

use super::HandlerContext;
use crate::config::parse_property;
use crate::error::ErrorSite;
use crate::network::protocol::{Completion, IssCommand};
use tracing::{error, info};

/// Asks the ISS to move the fold mirror to `mirror_fold_position`.
///
/// Fails with [`ErrorSite::FoldPositionProperty`] if the position is not configured and with
/// [`ErrorSite::FoldMove`] if the ISS does not report success.
pub async fn move_fold(ctx: &HandlerContext) -> Result<(), Completion> {
    let mirror_position: i32 = parse_property(
        "mirror_fold_position",
        ctx.settings.mirror_fold_position.as_deref(),
    )
    .map_err(|e| {
        error!("moveFold: {e}");
        Completion::failure(ErrorSite::FoldPositionProperty, format!("moveFold:{e}"))
    })?;

    info!(mirror_position, "Moving fold mirror");
    let done = ctx
        .iss
        .send(
            IssCommand::MoveFold { mirror_position },
            &ctx.acknowledger,
            &ctx.abort,
        )
        .await;
    if !done.successful {
        error!(error_num = done.error_num, "moveFold: {}", done.error_string);
        return Err(Completion::failure(ErrorSite::FoldMove, done.error_string));
    }
    Ok(())
}
