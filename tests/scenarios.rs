//! End-to-end scenarios (§8), driven entirely through the crate's public API: build a
//! [`RuntimeContext`] against a tempdir fixture, then call [`run_with_context`]. Uses local fake
//! [`Transport`]/[`TelemetrySink`]/[`Sleeper`] implementations since `test_support` is
//! `#[cfg(test)]`-only inside the lib and not visible to this integration binary.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::tempdir;

use upload_stblogs::context::{
    CertificatePaths, DeviceIdentity, Endpoints, Flags, Paths, RetryPolicy, RuntimeContext, Settings, SidecarPaths,
};
use upload_stblogs::run_with_context;
use upload_stblogs::telemetry::TelemetrySink;
use upload_stblogs::upload::transport::{PutTlsProfile, StageAAuth, TlsOptions, Transport, TransportResponse};
use upload_stblogs::workflow::Sleeper;
use upload_stblogs::{Invocation, EXIT_SUCCESS, EXIT_UPLOAD_FAILED};

fn fixture_ctx(tmp: &Utf8Path) -> RuntimeContext {
    RuntimeContext {
        identity: DeviceIdentity::new("AA:BB:CC:DD:EE:FF", "mediaclient", "prod"),
        paths: Paths {
            main_log_dir: tmp.join("logs"),
            previous_boot_log_dir: tmp.join("previousboot"),
            previous_boot_backup_dir: tmp.join("previousboot_backup"),
            dcm_batch_dir: tmp.join("dcm"),
            dri_log_dir: tmp.join("dri"),
            telemetry_dir: tmp.join("telemetry"),
            temp_dir: tmp.join("tmp"),
            cert_dir: tmp.join("certs"),
            rrd_archive_path: tmp.join("rrd_upload.tgz"),
        },
        endpoints: Endpoints {
            upload_url: "https://example.com/upload".into(),
            proxy_bucket_host: Some("proxy.example".into()),
            codebig_bearer_token: "test-token".into(),
        },
        flags: Flags::default(),
        settings: Settings::default(),
        retry_policy: RetryPolicy::default(),
        certs: CertificatePaths {
            client_cert: Utf8PathBuf::from("cert"),
            client_key: Utf8PathBuf::from("key"),
            ca_bundle: Utf8PathBuf::from("ca"),
        },
        sidecars: SidecarPaths {
            presigned_url_sidecar: tmp.join("httpresult.txt"),
            direct_block_marker: tmp.join("direct_block"),
            codebig_block_marker: tmp.join("codebig_block"),
            ondemand_status_sidecar: tmp.join("loguploadstatus.txt"),
            dcm_batch_list: tmp.join("dcm_batch_list.txt"),
            reboot_reason_file: tmp.join("rebootInfo.log"),
            dcm_settings_file: tmp.join("dcmsettings.conf"),
        },
        dry_run: false,
        uptime_override: Some(Duration::from_secs(3600)),
    }
}

#[derive(Debug, Clone)]
enum ScriptedCall {
    Post { http_status: u16, transport_code: i32, body: &'static str },
    Put { http_status: u16, transport_code: i32 },
}

#[derive(Default)]
struct ScriptedTransport {
    calls: RefCell<VecDeque<ScriptedCall>>,
}

impl ScriptedTransport {
    fn new(calls: Vec<ScriptedCall>) -> Self {
        Self { calls: RefCell::new(calls.into()) }
    }
}

impl Transport for ScriptedTransport {
    fn post_presign(
        &self,
        _url: &str,
        _auth: &StageAAuth<'_>,
        _tls: &TlsOptions,
        _filename: &str,
        _md5_base64: Option<&str>,
    ) -> TransportResponse {
        match self.calls.borrow_mut().pop_front() {
            Some(ScriptedCall::Post { http_status, transport_code, body }) => {
                TransportResponse { http_status, transport_code, body: body.as_bytes().to_vec() }
            }
            other => panic!("expected scripted POST, found {other:?} or queue exhausted"),
        }
    }

    fn put_file(&self, _url: &str, _tls_profile: &PutTlsProfile<'_>, _tls: &TlsOptions, _file: &Utf8Path) -> TransportResponse {
        match self.calls.borrow_mut().pop_front() {
            Some(ScriptedCall::Put { http_status, transport_code }) => {
                TransportResponse { http_status, transport_code, body: Vec::new() }
            }
            other => panic!("expected scripted PUT, found {other:?} or queue exhausted"),
        }
    }
}

#[derive(Default)]
struct RecordingTelemetry {
    counts: RefCell<Vec<String>>,
}

impl TelemetrySink for RecordingTelemetry {
    fn count(&self, name: &str) {
        self.counts.borrow_mut().push(name.to_string());
    }
    fn value(&self, _name: &str, _value: &str) {}
}

#[derive(Default)]
struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep(&self, _duration: Duration) {}
}

fn write_logs(dir: &Utf8Path) {
    std::fs::create_dir_all(dir.as_std_path()).unwrap();
    std::fs::write(dir.join("mediaserver.log"), b"hello").unwrap();
    std::fs::write(dir.join("panic.txt"), b"oops").unwrap();
}

/// S1: OnDemand happy path. trigger_type 5, flag set, logs present, Direct succeeds first try.
#[test]
fn s1_ondemand_happy_path() {
    let tmp = tempdir().unwrap();
    let mut ctx = fixture_ctx(tmp.path());
    ctx.flags.trigger_type = 5;
    ctx.flags.flag = true;
    write_logs(&ctx.paths.main_log_dir);
    std::fs::create_dir_all(ctx.paths.temp_dir.as_std_path()).unwrap();

    let transport = ScriptedTransport::new(vec![
        ScriptedCall::Post { http_status: 200, transport_code: 0, body: "https://s3.example/a?sig=1" },
        ScriptedCall::Put { http_status: 200, transport_code: 0 },
    ]);
    let telemetry = RecordingTelemetry::default();
    let sleeper = NoopSleeper;
    let env = Invocation { telemetry: &telemetry, transport: &transport, sleeper: &sleeper };

    let exit_code = run_with_context(&ctx, &env);
    assert_eq!(exit_code, EXIT_SUCCESS);
    let status = std::fs::read_to_string(ctx.sidecars.ondemand_status_sidecar.as_std_path()).unwrap();
    assert!(status.starts_with("Complete"));
    assert!(!ctx.paths.temp_dir.join("log_on_demand").exists());
}

/// S2: Reboot with DRI. NonDcm strategy (dcm_flag == 0, always eligible), DRI dir present.
#[test]
fn s2_reboot_with_dri_uploads_both_archives() {
    let tmp = tempdir().unwrap();
    let mut ctx = fixture_ctx(tmp.path());
    ctx.flags.dcm_flag = false;
    ctx.settings.include_dri = true;
    write_logs(&ctx.paths.previous_boot_log_dir);
    std::fs::create_dir_all(ctx.paths.main_log_dir.as_std_path()).unwrap();
    std::fs::create_dir_all(ctx.paths.previous_boot_backup_dir.as_std_path()).unwrap();
    std::fs::create_dir_all(ctx.paths.dri_log_dir.as_std_path()).unwrap();
    std::fs::write(ctx.paths.dri_log_dir.join("dri.bin"), b"dri").unwrap();

    let transport = ScriptedTransport::new(vec![
        ScriptedCall::Post { http_status: 200, transport_code: 0, body: "https://s3.example/main?sig=1" },
        ScriptedCall::Put { http_status: 200, transport_code: 0 },
        ScriptedCall::Post { http_status: 200, transport_code: 0, body: "https://s3.example/dri?sig=2" },
        ScriptedCall::Put { http_status: 200, transport_code: 0 },
    ]);
    let telemetry = RecordingTelemetry::default();
    let sleeper = NoopSleeper;
    let env = Invocation { telemetry: &telemetry, transport: &transport, sleeper: &sleeper };

    let exit_code = run_with_context(&ctx, &env);
    assert_eq!(exit_code, EXIT_SUCCESS);
    assert!(telemetry.counts.borrow().iter().any(|c| c == "SYST_INFO_PDRILogUpload"));
}

/// S3: Direct fails, CodeBig succeeds. Fallback swap, both-channel block markers per the
/// asymmetric rule (CodeBig success after Direct failure blocks Direct too).
#[test]
fn s3_direct_fails_codebig_succeeds_blocks_direct() {
    let tmp = tempdir().unwrap();
    let mut ctx = fixture_ctx(tmp.path());
    ctx.flags.trigger_type = 5;
    ctx.flags.flag = true;
    write_logs(&ctx.paths.main_log_dir);
    std::fs::create_dir_all(ctx.paths.temp_dir.as_std_path()).unwrap();

    let transport = ScriptedTransport::new(vec![
        ScriptedCall::Post { http_status: 500, transport_code: 0, body: "" },
        ScriptedCall::Post { http_status: 500, transport_code: 0, body: "" },
        ScriptedCall::Post { http_status: 500, transport_code: 0, body: "" },
        ScriptedCall::Post { http_status: 200, transport_code: 0, body: "https://s3.example/cb?sig=1" },
        ScriptedCall::Put { http_status: 200, transport_code: 0 },
    ]);
    let telemetry = RecordingTelemetry::default();
    let sleeper = NoopSleeper;
    let env = Invocation { telemetry: &telemetry, transport: &transport, sleeper: &sleeper };

    let exit_code = run_with_context(&ctx, &env);
    assert_eq!(exit_code, EXIT_SUCCESS);
    assert!(std::fs::metadata(ctx.sidecars.direct_block_marker.as_std_path()).is_ok());
    assert!(std::fs::metadata(ctx.sidecars.codebig_block_marker.as_std_path()).is_err());
}

/// S4: HTTP 404 is terminal on the only available channel (CodeBig blocked). No retry, upload
/// fails outright, exit code 1.
#[test]
fn s4_http_404_is_terminal() {
    let tmp = tempdir().unwrap();
    let mut ctx = fixture_ctx(tmp.path());
    ctx.flags.trigger_type = 5;
    ctx.flags.flag = true;
    ctx.settings.codebig_channel_blocked_override = true;
    write_logs(&ctx.paths.main_log_dir);
    std::fs::create_dir_all(ctx.paths.temp_dir.as_std_path()).unwrap();

    let transport = ScriptedTransport::new(vec![
        ScriptedCall::Post { http_status: 404, transport_code: 0, body: "" },
    ]);
    let telemetry = RecordingTelemetry::default();
    let sleeper = NoopSleeper;
    let env = Invocation { telemetry: &telemetry, transport: &transport, sleeper: &sleeper };

    let exit_code = run_with_context(&ctx, &env);
    assert_eq!(exit_code, EXIT_UPLOAD_FAILED);
}

/// S5: Direct Stage B fails but the device is a media client with a proxy bucket configured, so
/// the proxy-PUT fallback resolves the attempt without ever touching CodeBig.
#[test]
fn s5_proxy_fallback_resolves_without_codebig() {
    let tmp = tempdir().unwrap();
    let mut ctx = fixture_ctx(tmp.path());
    ctx.flags.trigger_type = 5;
    ctx.flags.flag = true;
    write_logs(&ctx.paths.main_log_dir);
    std::fs::create_dir_all(ctx.paths.temp_dir.as_std_path()).unwrap();

    let transport = ScriptedTransport::new(vec![
        ScriptedCall::Post { http_status: 200, transport_code: 0, body: "https://s3.example/main?sig=1" },
        ScriptedCall::Put { http_status: 403, transport_code: 0 },
        ScriptedCall::Put { http_status: 200, transport_code: 0 },
    ]);
    let telemetry = RecordingTelemetry::default();
    let sleeper = NoopSleeper;
    let env = Invocation { telemetry: &telemetry, transport: &transport, sleeper: &sleeper };

    let exit_code = run_with_context(&ctx, &env);
    assert_eq!(exit_code, EXIT_SUCCESS);
}

/// S6: privacy opt-out aborts cleanly with no filesystem mutation and no upload attempt.
#[test]
fn s6_privacy_opt_out_aborts_cleanly() {
    let tmp = tempdir().unwrap();
    let mut ctx = fixture_ctx(tmp.path());
    ctx.settings.privacy_opt_out = true;
    ctx.flags.trigger_type = 5;
    write_logs(&ctx.paths.main_log_dir);

    let transport = ScriptedTransport::new(vec![]);
    let telemetry = RecordingTelemetry::default();
    let sleeper = NoopSleeper;
    let env = Invocation { telemetry: &telemetry, transport: &transport, sleeper: &sleeper };

    let exit_code = run_with_context(&ctx, &env);
    assert_eq!(exit_code, EXIT_SUCCESS);
    assert!(telemetry.counts.borrow().iter().any(|c| c == "PrivacyOptOutAbort"));
    assert!(ctx.paths.main_log_dir.join("mediaserver.log").exists(), "no logs should be touched");
}
