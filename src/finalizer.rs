//! Block-Marker & Cleanup Finalizer (C10): runs unconditionally at the end of every invocation.
//! Grounded on SPEC_FULL.md §4.6 plus `fs_ops`'s touch/remove primitives.

use anyhow::Result;
use camino::Utf8Path;
use tracing::{info, instrument, warn};

use crate::context::{Channel, RuntimeContext};
use crate::fs_ops;
use crate::session::Session;

/// Apply §4.6's archive-release and block-marker rules. Idempotent and infallible from the
/// caller's perspective in the sense that every sub-step is best-effort: a failure to remove the
/// archive or touch a marker is logged, not propagated, since the finalizer itself must never be
/// the reason an invocation that already succeeded reports failure.
#[instrument(skip(ctx, session), fields(success = session.success))]
pub fn finalize(ctx: &RuntimeContext, session: &Session, archive_path: Option<&Utf8Path>) -> Result<()> {
    release_archive(session, archive_path);
    update_block_markers(ctx, session);
    purge_ephemeral_sidecars(ctx);
    Ok(())
}

fn release_archive(session: &Session, archive_path: Option<&Utf8Path>) {
    let Some(path) = archive_path else { return };
    if session.success {
        if let Err(e) = std::fs::remove_file(path.as_std_path()) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, %path, "failed to remove archive after successful upload");
            }
        } else {
            info!(%path, "archive removed after successful upload");
        }
    } else {
        info!(%path, "preserving archive on disk for post-mortem after failed upload");
    }
}

fn update_block_markers(ctx: &RuntimeContext, session: &Session) {
    if session.attempted_and_failed(Channel::Direct) {
        touch_marker(ctx, Channel::Direct);
    }
    if session.attempted_and_failed(Channel::CodeBig) {
        touch_marker(ctx, Channel::CodeBig);
    }

    // §9 Open Question 3: CodeBig succeeding after Direct was attempted also blocks Direct — an
    // asymmetric rule preserved from the original agent. Flagged at `warn` so operators notice it
    // in logs rather than inferring it from marker timestamps alone.
    if session.used_fallback && session.succeeded_channel == Some(Channel::CodeBig) && session.was_attempted(Channel::Direct) {
        warn!(
            asymmetric_block_rule = true,
            "CodeBig succeeded after Direct failed; blocking Direct per the original agent's block-marker rule"
        );
        touch_marker(ctx, Channel::Direct);
    }
}

fn touch_marker(ctx: &RuntimeContext, channel: Channel) {
    let path = ctx.block_marker_path(channel);
    if let Err(e) = fs_ops::touch_now(path) {
        warn!(error = %e, channel = channel.as_str(), %path, "failed to touch block marker");
    } else {
        info!(channel = channel.as_str(), %path, "block marker updated");
    }
}

/// Best-effort cleanup of the presigned-URL sidecar; its absence on the next invocation is
/// harmless since Stage A always rewrites it.
fn purge_ephemeral_sidecars(ctx: &RuntimeContext) {
    let path = &ctx.sidecars.presigned_url_sidecar;
    if let Err(e) = std::fs::remove_file(path.as_std_path()) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, %path, "failed to purge presigned-url sidecar");
        }
    }
}
