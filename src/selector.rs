//! Strategy Selector (C6): computes exactly one [`Strategy`] from immutable context, plus the
//! channel-selection cascade that runs right after it. Grounded on `strategy_selector.h` and
//! SPEC_FULL.md §4.1 — a pure function over [`RuntimeContext`] and filesystem state.

use tracing::{info, instrument};

use crate::context::{Channel, RuntimeContext};
use crate::fs_ops;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Rrd,
    PrivacyAbort,
    NoLogs,
    OnDemand,
    NonDcm,
    Reboot,
    Dcm,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Rrd => "RRD",
            Strategy::PrivacyAbort => "PrivacyAbort",
            Strategy::NoLogs => "NoLogs",
            Strategy::OnDemand => "OnDemand",
            Strategy::NonDcm => "NonDcm",
            Strategy::Reboot => "Reboot",
            Strategy::Dcm => "Dcm",
        }
    }

    /// Whether this strategy runs through the four-phase workflow engine (§4.2) at all.
    pub fn uses_workflow_engine(self) -> bool {
        !matches!(self, Strategy::Rrd | Strategy::PrivacyAbort | Strategy::NoLogs)
    }
}

/// The ordered cascade from §4.1: first match wins.
#[instrument(skip_all)]
pub fn select_strategy(ctx: &RuntimeContext) -> Strategy {
    let strategy = if ctx.flags.rrd_flag {
        Strategy::Rrd
    } else if ctx.settings.privacy_opt_out {
        Strategy::PrivacyAbort
    } else if ctx.paths.previous_boot_log_dir.exists()
        && !fs_ops::has_log_files(&ctx.paths.previous_boot_log_dir)
    {
        Strategy::NoLogs
    } else if ctx.flags.trigger_type == 5 {
        Strategy::OnDemand
    } else if !ctx.flags.dcm_flag {
        Strategy::NonDcm
    } else if ctx.flags.upload_on_reboot && ctx.flags.flag {
        Strategy::Reboot
    } else {
        Strategy::Dcm
    };
    info!(strategy = strategy.as_str(), "strategy selected");
    strategy
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelSelection {
    pub primary: Option<Channel>,
    pub fallback: Option<Channel>,
}

/// Channel selection cascade, run after strategy selection (§4.1). A channel is "blocked" iff its
/// block-marker mtime is within its configured block duration of now.
#[instrument(skip_all)]
pub fn select_channels(ctx: &RuntimeContext) -> ChannelSelection {
    let direct_blocked = ctx.settings.direct_channel_blocked_override || is_blocked(ctx, Channel::Direct);
    let codebig_blocked = ctx.settings.codebig_channel_blocked_override || is_blocked(ctx, Channel::CodeBig);

    let selection = match (direct_blocked, codebig_blocked) {
        (false, false) => ChannelSelection {
            primary: Some(Channel::Direct),
            fallback: Some(Channel::CodeBig),
        },
        (true, false) => ChannelSelection {
            primary: Some(Channel::CodeBig),
            fallback: None,
        },
        (false, true) => ChannelSelection {
            primary: Some(Channel::Direct),
            fallback: None,
        },
        (true, true) => ChannelSelection {
            primary: None,
            fallback: None,
        },
    };
    info!(
        primary = selection.primary.map(Channel::as_str),
        fallback = selection.fallback.map(Channel::as_str),
        "channel selection"
    );
    selection
}

fn is_blocked(ctx: &RuntimeContext, channel: Channel) -> bool {
    let marker = ctx.block_marker_path(channel);
    match fs_ops::age_of(marker) {
        Ok(Some(age)) => age < ctx.block_duration(channel),
        _ => false,
    }
}
