//! Configuration Loader (C12): layers CLI flags over an optional TOML settings document into a
//! typed [`AgentConfig`], the same two-step shape `compute_ctl` uses (parse `clap::Command`, then
//! fold a spec document's fields on top of/under the CLI-supplied values).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Arg, ArgAction};

use crate::context::{CertificatePaths, Endpoints, Flags, Paths, RetryPolicy, Settings};
use crate::error::AgentError;

const DEFAULT_LOG_PATH: &str = "/opt/logs";
const OCSP_STAPLING_MARKER: &str = "/tmp/.EnableOCSPStapling";
const OCSP_CA_MARKER: &str = "/tmp/.EnableOCSPCA";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub mac_colon: String,
    pub device_type: String,
    pub build_type: String,
    pub paths: Paths,
    pub endpoints: Endpoints,
    pub flags: Flags,
    pub settings: Settings,
    pub retry_policy: RetryPolicy,
    pub certs: CertificatePaths,
    pub dry_run: bool,
}

/// Raw document shape for `--config`. Every field is optional; absence means "use the CLI value or
/// the built-in default."
#[derive(Debug, Default, serde::Deserialize)]
struct ConfigFile {
    #[serde(rename = "LOG_PATH")]
    log_path: Option<String>,
    #[serde(rename = "DCM_LOG_PATH")]
    dcm_log_path: Option<String>,
    #[serde(rename = "DRI_LOG_PATH")]
    dri_log_path: Option<String>,
    rrd_archive_path: Option<String>,
    #[serde(rename = "LOG_UPLOAD_ENDPOINT_URL")]
    upload_url: Option<String>,
    proxy_bucket_host: Option<String>,
    codebig_bearer_token: Option<String>,
    #[serde(rename = "EncryptCloudUpload.Enable")]
    encrypt_cloud_upload: Option<bool>,
    #[serde(rename = "UploadLogsOnUnscheduledReboot.Disable")]
    upload_on_unscheduled_reboot_disable: Option<bool>,
    privacy_opt_out: Option<bool>,
    include_pcap: Option<bool>,
    include_dri: Option<bool>,
    tls_enabled: Option<bool>,
    direct_channel_blocked: Option<bool>,
    codebig_channel_blocked: Option<bool>,
    direct_max_attempts: Option<u32>,
    codebig_max_attempts: Option<u32>,
    http_timeout_secs: Option<u64>,
    tls_handshake_timeout_secs: Option<u64>,
    client_cert: Option<String>,
    client_key: Option<String>,
    ca_bundle: Option<String>,
    cert_dir: Option<String>,
    telemetry_dir: Option<String>,
    temp_dir: Option<String>,
}

/// CLI-level arguments, built/parsed with the same `clap::Command` builder style as `compute_ctl`.
#[derive(Debug, Clone)]
pub struct AgentCliArgs {
    pub mac: String,
    pub device_type: String,
    pub build_type: String,
    pub config_path: Option<Utf8PathBuf>,
    pub rrd_flag: bool,
    pub dcm_flag: bool,
    pub flag: bool,
    pub upload_on_reboot: bool,
    pub trigger_type: u8,
    pub dry_run: bool,
}

pub fn cli() -> clap::Command {
    clap::Command::new("upload_stblogs")
        .version(option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"))
        .arg(
            Arg::new("mac")
                .long("mac")
                .value_name("MAC_ADDRESS")
                .required(true),
        )
        .arg(
            Arg::new("device-type")
                .long("device-type")
                .value_name("DEVICE_TYPE")
                .default_value("generic"),
        )
        .arg(
            Arg::new("build-type")
                .long("build-type")
                .value_name("BUILD_TYPE")
                .default_value("prod"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("CONFIG_TOML"),
        )
        .arg(
            Arg::new("rrd-flag")
                .long("rrd-flag")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dcm-flag")
                .long("dcm-flag")
                .action(ArgAction::SetTrue),
        )
        .arg(Arg::new("flag").long("flag").action(ArgAction::SetTrue))
        .arg(
            Arg::new("upload-on-reboot")
                .long("upload-on-reboot")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("trigger-type")
                .long("trigger-type")
                .value_name("TRIGGER_TYPE")
                .value_parser(clap::value_parser!(u8))
                .default_value("0"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Skip network I/O; log the actions that would be taken"),
        )
}

impl AgentCliArgs {
    pub fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            mac: matches.get_one::<String>("mac").cloned().unwrap_or_default(),
            device_type: matches
                .get_one::<String>("device-type")
                .cloned()
                .unwrap_or_else(|| "generic".to_string()),
            build_type: matches
                .get_one::<String>("build-type")
                .cloned()
                .unwrap_or_else(|| "prod".to_string()),
            config_path: matches.get_one::<String>("config").map(Utf8PathBuf::from),
            rrd_flag: matches.get_flag("rrd-flag"),
            dcm_flag: matches.get_flag("dcm-flag"),
            flag: matches.get_flag("flag"),
            upload_on_reboot: matches.get_flag("upload-on-reboot"),
            trigger_type: *matches.get_one::<u8>("trigger-type").unwrap_or(&0),
            dry_run: matches.get_flag("dry-run"),
        }
    }
}

impl AgentConfig {
    pub fn load(args: AgentCliArgs) -> Result<AgentConfig> {
        if args.mac.is_empty() {
            return Err(AgentError::InvalidArgument("mac address is required".into()).into());
        }

        let file = match &args.config_path {
            Some(path) => read_config_file(path.as_std_path())
                .with_context(|| format!("reading config file {path}"))?,
            None => ConfigFile::default(),
        };

        let log_path = file.log_path.clone().unwrap_or_else(|| DEFAULT_LOG_PATH.to_string());
        let main_log_dir = Utf8PathBuf::from(&log_path);

        let upload_url = file
            .upload_url
            .clone()
            .ok_or_else(|| AgentError::Config("LOG_UPLOAD_ENDPOINT_URL is required".into()))?;

        let paths = Paths {
            previous_boot_log_dir: main_log_dir.join("previousboot"),
            previous_boot_backup_dir: main_log_dir.join("previousboot_backup"),
            dcm_batch_dir: file
                .dcm_log_path
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Utf8PathBuf::from("/tmp/dcm")),
            dri_log_dir: file
                .dri_log_path
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| main_log_dir.join("dri")),
            telemetry_dir: file
                .telemetry_dir
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Utf8PathBuf::from("/opt/telemetry")),
            temp_dir: file
                .temp_dir
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Utf8PathBuf::from("/tmp")),
            cert_dir: file
                .cert_dir
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Utf8PathBuf::from("/etc/ssl/certs/stb")),
            rrd_archive_path: file
                .rrd_archive_path
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Utf8PathBuf::from("/tmp/rrd_upload.tgz")),
            main_log_dir,
        };

        let endpoints = Endpoints {
            upload_url,
            proxy_bucket_host: file.proxy_bucket_host.clone(),
            codebig_bearer_token: file.codebig_bearer_token.clone().unwrap_or_default(),
        };

        let flags = Flags {
            rrd_flag: args.rrd_flag,
            dcm_flag: args.dcm_flag,
            flag: args.flag,
            upload_on_reboot: args.upload_on_reboot,
            trigger_type: args.trigger_type,
        };

        let ocsp_enabled = Path::new(OCSP_STAPLING_MARKER).exists() || Path::new(OCSP_CA_MARKER).exists();

        let settings = Settings {
            privacy_opt_out: file.privacy_opt_out.unwrap_or(false),
            ocsp_enabled,
            encrypt_cloud_upload: file.encrypt_cloud_upload.unwrap_or(false),
            direct_channel_blocked_override: file.direct_channel_blocked.unwrap_or(false),
            codebig_channel_blocked_override: file.codebig_channel_blocked.unwrap_or(false),
            include_pcap: file.include_pcap.unwrap_or(false),
            include_dri: file.include_dri.unwrap_or(false),
            tls_enabled: file.tls_enabled.unwrap_or(true),
            upload_logs_on_unscheduled_reboot_disabled: file
                .upload_on_unscheduled_reboot_disable
                .unwrap_or(false),
        };

        let mut retry_policy = RetryPolicy::default();
        if let Some(v) = file.direct_max_attempts {
            retry_policy.direct_max_attempts = v;
        }
        if let Some(v) = file.codebig_max_attempts {
            retry_policy.codebig_max_attempts = v;
        }
        if let Some(v) = file.http_timeout_secs {
            retry_policy.http_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.tls_handshake_timeout_secs {
            retry_policy.tls_handshake_timeout = Duration::from_secs(v);
        }

        let certs = CertificatePaths {
            client_cert: file
                .client_cert
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Utf8PathBuf::from("/etc/ssl/certs/stb/client.crt")),
            client_key: file
                .client_key
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Utf8PathBuf::from("/etc/ssl/certs/stb/client.key")),
            ca_bundle: file
                .ca_bundle
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Utf8PathBuf::from("/etc/ssl/certs/stb/ca.pem")),
        };

        Ok(AgentConfig {
            mac_colon: args.mac,
            device_type: args.device_type,
            build_type: args.build_type,
            paths,
            endpoints,
            flags,
            settings,
            retry_policy,
            certs,
            dry_run: args.dry_run,
        })
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let doc: ConfigFile = toml_edit::de::from_str(&text)
        .with_context(|| format!("parsing {} as TOML", path.display()))?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_requires_mac() {
        let args = AgentCliArgs {
            mac: String::new(),
            device_type: "generic".into(),
            build_type: "prod".into(),
            config_path: None,
            rrd_flag: false,
            dcm_flag: false,
            flag: false,
            upload_on_reboot: false,
            trigger_type: 0,
            dry_run: false,
        };
        assert!(AgentConfig::load(args).is_err());
    }

    #[test]
    fn load_requires_upload_url_from_config_file() {
        let args = AgentCliArgs {
            mac: "AA:BB:CC:DD:EE:FF".into(),
            device_type: "generic".into(),
            build_type: "prod".into(),
            config_path: None,
            rrd_flag: false,
            dcm_flag: false,
            flag: false,
            upload_on_reboot: false,
            trigger_type: 0,
            dry_run: false,
        };
        let err = AgentConfig::load(args).unwrap_err();
        assert!(err.to_string().contains("LOG_UPLOAD_ENDPOINT_URL") || format!("{err:?}").contains("LOG_UPLOAD_ENDPOINT_URL"));
    }

    #[test]
    fn verify_cli() {
        cli().debug_assert();
    }
}
