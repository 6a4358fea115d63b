//! Session State (C1): per-invocation mutable bookkeeping. One [`Session`] is created per upload
//! attempt-set (the main archive and, for Reboot-with-DRI, a second fresh session for the DRI
//! archive — see SPEC_FULL.md §4.2.2).

use camino::Utf8PathBuf;

use crate::context::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Success,
    Failed,
    Retry,
    Aborted,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelAttempts {
    pub count: u32,
    pub last_http_status: u16,
    pub last_transport_code: i32,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub primary: Option<Channel>,
    pub fallback: Option<Channel>,
    pub direct: ChannelAttempts,
    pub codebig: ChannelAttempts,
    pub used_fallback: bool,
    pub success: bool,
    /// Which channel the successful attempt landed on, if any.
    pub succeeded_channel: Option<Channel>,
    pub archive_name: Option<Utf8PathBuf>,
    pub presigned_url: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            primary: None,
            fallback: None,
            direct: ChannelAttempts::default(),
            codebig: ChannelAttempts::default(),
            used_fallback: false,
            success: false,
            succeeded_channel: None,
            archive_name: None,
            presigned_url: None,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self, channel: Channel) -> &ChannelAttempts {
        match channel {
            Channel::Direct => &self.direct,
            Channel::CodeBig => &self.codebig,
        }
    }

    pub fn attempts_mut(&mut self, channel: Channel) -> &mut ChannelAttempts {
        match channel {
            Channel::Direct => &mut self.direct,
            Channel::CodeBig => &mut self.codebig,
        }
    }

    pub fn record_attempt(&mut self, channel: Channel, http_status: u16, transport_code: i32) {
        let attempts = self.attempts_mut(channel);
        attempts.count += 1;
        attempts.last_http_status = http_status;
        attempts.last_transport_code = transport_code;
    }

    /// Was this channel attempted at all this invocation?
    pub fn was_attempted(&self, channel: Channel) -> bool {
        self.attempts(channel).count > 0
    }

    /// Did this channel get attempted but never end up as the successful one?
    pub fn attempted_and_failed(&self, channel: Channel) -> bool {
        self.was_attempted(channel) && self.succeeded_channel != Some(channel)
    }

    pub fn mark_success(&mut self, channel: Channel) {
        self.success = true;
        self.succeeded_channel = Some(channel);
    }

    pub fn swap_channels(&mut self) {
        std::mem::swap(&mut self.primary, &mut self.fallback);
        self.used_fallback = true;
    }
}
