//! Runtime Context (C1): immutable configuration for one invocation, built once from
//! [`crate::config::AgentConfig`] plus the platform accessors (MAC, device type) the caller
//! supplies. Nothing in here is mutated after [`RuntimeContext::new`] returns.

use std::time::Duration;

use camino::Utf8PathBuf;

use crate::config::AgentConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Direct,
    CodeBig,
}

impl Channel {
    pub fn other(self) -> Channel {
        match self {
            Channel::Direct => Channel::CodeBig,
            Channel::CodeBig => Channel::Direct,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Direct => "Direct",
            Channel::CodeBig => "CodeBig",
        }
    }
}

/// Device identity, reported once by the platform accessors and never re-read mid-invocation.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Canonical MAC with colons, e.g. `AA:BB:CC:DD:EE:FF`.
    pub mac_colon: String,
    /// Compact MAC with no separators, used in archive filenames.
    pub mac_compact: String,
    pub device_type: String,
    pub build_type: String,
}

impl DeviceIdentity {
    pub fn new(mac_colon: impl Into<String>, device_type: impl Into<String>, build_type: impl Into<String>) -> Self {
        let mac_colon = mac_colon.into();
        let mac_compact = mac_colon.replace(':', "");
        Self {
            mac_colon,
            mac_compact,
            device_type: device_type.into(),
            build_type: build_type.into(),
        }
    }

    /// The one behavioral effect of the device type: media clients get PCAP collection and proxy
    /// fallback eligibility (§3, §4.4).
    pub fn is_media_client(&self) -> bool {
        self.device_type == "mediaclient"
    }
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub main_log_dir: Utf8PathBuf,
    pub previous_boot_log_dir: Utf8PathBuf,
    pub previous_boot_backup_dir: Utf8PathBuf,
    pub dcm_batch_dir: Utf8PathBuf,
    pub dri_log_dir: Utf8PathBuf,
    pub telemetry_dir: Utf8PathBuf,
    pub temp_dir: Utf8PathBuf,
    pub cert_dir: Utf8PathBuf,
    /// Pre-built single-file archive consumed by the RRD pass-through path (§4.2.4); produced by
    /// an external collaborator (the "Remote Debug" tool), not by this agent's archive builder.
    pub rrd_archive_path: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub upload_url: String,
    pub proxy_bucket_host: Option<String>,
    /// OAuth bearer token for the CodeBig channel's Stage A request (§4.4).
    pub codebig_bearer_token: String,
}

/// External flags, read once at startup (§3).
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    pub rrd_flag: bool,
    pub dcm_flag: bool,
    pub flag: bool,
    pub upload_on_reboot: bool,
    pub trigger_type: u8,
}

/// External settings, read once at startup (§3).
#[derive(Debug, Clone, Copy, Default)]
pub struct Settings {
    pub privacy_opt_out: bool,
    pub ocsp_enabled: bool,
    pub encrypt_cloud_upload: bool,
    pub direct_channel_blocked_override: bool,
    pub codebig_channel_blocked_override: bool,
    pub include_pcap: bool,
    pub include_dri: bool,
    pub tls_enabled: bool,
    pub upload_logs_on_unscheduled_reboot_disabled: bool,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub direct_max_attempts: u32,
    pub codebig_max_attempts: u32,
    pub direct_block_duration: Duration,
    pub codebig_block_duration: Duration,
    pub http_timeout: Duration,
    pub tls_handshake_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            direct_max_attempts: 3,
            codebig_max_attempts: 3,
            direct_block_duration: Duration::from_secs(24 * 3600),
            codebig_block_duration: Duration::from_secs(30 * 60),
            http_timeout: Duration::from_secs(30),
            tls_handshake_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CertificatePaths {
    pub client_cert: Utf8PathBuf,
    pub client_key: Utf8PathBuf,
    pub ca_bundle: Utf8PathBuf,
}

/// Bit-exact well-known sidecar paths (§6).
#[derive(Debug, Clone)]
pub struct SidecarPaths {
    pub presigned_url_sidecar: Utf8PathBuf,
    pub direct_block_marker: Utf8PathBuf,
    pub codebig_block_marker: Utf8PathBuf,
    pub ondemand_status_sidecar: Utf8PathBuf,
    pub dcm_batch_list: Utf8PathBuf,
    pub reboot_reason_file: Utf8PathBuf,
    /// TR-069/TR-181 settings document containing the `urn:settings:LogUploadSettings:upload`
    /// line the Dcm workflow's setup phase gates on (§4.2.3).
    pub dcm_settings_file: Utf8PathBuf,
}

impl Default for SidecarPaths {
    fn default() -> Self {
        Self {
            presigned_url_sidecar: Utf8PathBuf::from("/tmp/httpresult.txt"),
            direct_block_marker: Utf8PathBuf::from("/tmp/.lastdirectfail_upl"),
            codebig_block_marker: Utf8PathBuf::from("/tmp/.lastcodebigfail_upl"),
            ondemand_status_sidecar: Utf8PathBuf::from("/opt/loguploadstatus.txt"),
            dcm_batch_list: Utf8PathBuf::from("/tmp/dcm_batch_list.txt"),
            reboot_reason_file: Utf8PathBuf::from("/opt/logs/rebootInfo.log"),
            dcm_settings_file: Utf8PathBuf::from("/opt/logs/dcmsettings.conf"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub identity: DeviceIdentity,
    pub paths: Paths,
    pub endpoints: Endpoints,
    pub flags: Flags,
    pub settings: Settings,
    pub retry_policy: RetryPolicy,
    pub certs: CertificatePaths,
    pub sidecars: SidecarPaths,
    pub dry_run: bool,
    /// Test/diagnostic hook for the Reboot/NonDcm uptime-quiesce check (§4.2.2); `None` means
    /// "read `/proc/uptime`".
    pub uptime_override: Option<Duration>,
}

impl RuntimeContext {
    pub fn new(config: &AgentConfig, identity: DeviceIdentity) -> Self {
        Self {
            identity,
            paths: config.paths.clone(),
            endpoints: config.endpoints.clone(),
            flags: config.flags,
            settings: config.settings,
            retry_policy: config.retry_policy.clone(),
            certs: config.certs.clone(),
            sidecars: SidecarPaths::default(),
            dry_run: config.dry_run,
            uptime_override: None,
        }
    }

    pub fn max_attempts(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Direct => self.retry_policy.direct_max_attempts,
            Channel::CodeBig => self.retry_policy.codebig_max_attempts,
        }
    }

    pub fn block_duration(&self, channel: Channel) -> Duration {
        match channel {
            Channel::Direct => self.retry_policy.direct_block_duration,
            Channel::CodeBig => self.retry_policy.codebig_block_duration,
        }
    }

    pub fn block_marker_path(&self, channel: Channel) -> &Utf8PathBuf {
        match channel {
            Channel::Direct => &self.sidecars.direct_block_marker,
            Channel::CodeBig => &self.sidecars.codebig_block_marker,
        }
    }
}
