//! Retry/Fallback Controller (C9): per-channel attempt caps, terminal-vs-retryable
//! classification, and the one-time primary/fallback channel swap. Grounded on the original
//! `retry_logic.c` (`should_retry`/`increment_attempts`/`retry_upload`), translated into the loop
//! shape SPEC_FULL.md §4.5 describes.

use anyhow::Result;
use camino::Utf8Path;
use tracing::{info, instrument};

use crate::context::{Channel, RuntimeContext};
use crate::session::{Session, UploadOutcome};
use crate::telemetry::TelemetrySink;
use crate::upload::{self, transport::Transport, AttemptOutcome};

/// §4.5: whether to run Stage A again on the same channel. Only ever applies to a Stage-A-only
/// failure — once Stage A has succeeded, the attempt is resolved by Stage B/proxy and this
/// function is never consulted again for that channel (see [`run_channel`]).
fn should_retry(ctx: &RuntimeContext, session: &Session, channel: Channel) -> bool {
    let attempts = session.attempts(channel);
    if attempts.last_http_status == 0 {
        return false; // network failure never reached the server: fall back, don't retry.
    }
    if attempts.last_http_status == 404 {
        return false; // terminal: retry is pointless for this resource.
    }
    attempts.count < ctx.max_attempts(channel)
}

/// §4.5: swap to the fallback channel at most once per invocation, and only after the primary is
/// exhausted without success.
fn should_fallback(session: &Session) -> bool {
    !session.success && session.fallback.is_some() && !session.used_fallback
}

/// Retry Stage A on `channel` until it succeeds, is exhausted, or hits a terminal HTTP status;
/// then, if Stage A succeeded, resolve the attempt via Stage B/proxy exactly once (no further
/// Stage-A retry follows a Stage-B failure — §4.4's ordering contract).
#[instrument(skip(ctx, session, telemetry, transport), fields(channel = channel.as_str()))]
fn run_channel(
    ctx: &RuntimeContext,
    session: &mut Session,
    channel: Channel,
    archive_path: &Utf8Path,
    telemetry: &dyn TelemetrySink,
    transport: &dyn Transport,
) -> Result<bool> {
    loop {
        match upload::attempt(ctx, session, channel, archive_path, telemetry, transport)? {
            AttemptOutcome::StageAFailed => {
                if should_retry(ctx, session, channel) {
                    continue;
                }
                return Ok(false);
            }
            AttemptOutcome::Resolved { success } => return Ok(success),
        }
    }
}

/// C9's entry point: drive the primary channel, fall back once if eligible, and return the
/// invocation's overall upload outcome. Both-blocked is handled by the caller (no eligible
/// primary channel means `session.primary` is `None`).
#[instrument(skip(ctx, session, telemetry, transport))]
pub fn upload_with_retry_and_fallback(
    ctx: &RuntimeContext,
    session: &mut Session,
    archive_path: &Utf8Path,
    telemetry: &dyn TelemetrySink,
    transport: &dyn Transport,
) -> Result<UploadOutcome> {
    let Some(primary) = session.primary else {
        info!("both channels blocked; aborting upload with no attempts");
        return Ok(UploadOutcome::Aborted);
    };

    if run_channel(ctx, session, primary, archive_path, telemetry, transport)? {
        session.mark_success(primary);
        return Ok(UploadOutcome::Success);
    }

    if should_fallback(session) {
        session.swap_channels();
        let new_primary = session.primary.expect("swap_channels preserves a primary when fallback existed");
        if run_channel(ctx, session, new_primary, archive_path, telemetry, transport)? {
            session.mark_success(new_primary);
            return Ok(UploadOutcome::Success);
        }
    }

    Ok(UploadOutcome::Failed)
}
