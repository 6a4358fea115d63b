//! Shared test fixtures (C16, ambient): a minimal [`RuntimeContext`] builder plus fake
//! [`Transport`]/[`TelemetrySink`] implementations used across this crate's unit tests and
//! `tests/scenarios.rs`. Compiled only under `#[cfg(test)]`.

use std::cell::RefCell;
use std::collections::VecDeque;

use camino::{Utf8Path, Utf8PathBuf};

use crate::context::{
    CertificatePaths, DeviceIdentity, Endpoints, Flags, Paths, RetryPolicy, RuntimeContext, Settings, SidecarPaths,
};
use crate::telemetry::TelemetrySink;
use crate::upload::transport::{PutTlsProfile, StageAAuth, TlsOptions, Transport, TransportResponse};

/// A `RuntimeContext` rooted at a tempdir, with every path distinct and every setting at its
/// zero-value default. Individual tests mutate the fields they care about.
pub fn base_ctx(tmp: &Utf8Path) -> RuntimeContext {
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
            proxy_bucket_host: None,
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
        uptime_override: Some(std::time::Duration::from_secs(3600)),
    }
}

/// One scripted response for [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub enum ScriptedCall {
    Post { http_status: u16, transport_code: i32, body: &'static str },
    Put { http_status: u16, transport_code: i32 },
}

/// A [`Transport`] fake driven by a fixed queue of responses, one per call, in call order
/// (Stage A, then Stage B, then proxy PUT if reached). Panics if the queue is exhausted, which
/// surfaces unexpected extra calls (e.g. a second proxy PUT) as a test failure.
#[derive(Default)]
pub struct ScriptedTransport {
    calls: RefCell<VecDeque<ScriptedCall>>,
    log: RefCell<Vec<&'static str>>,
}

impl ScriptedTransport {
    pub fn new(calls: Vec<ScriptedCall>) -> Self {
        Self {
            calls: RefCell::new(calls.into()),
            log: RefCell::new(Vec::new()),
        }
    }

    pub fn call_log(&self) -> Vec<&'static str> {
        self.log.borrow().clone()
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
        self.log.borrow_mut().push("post");
        match self.calls.borrow_mut().pop_front() {
            Some(ScriptedCall::Post { http_status, transport_code, body }) => {
                TransportResponse { http_status, transport_code, body: body.as_bytes().to_vec() }
            }
            other => panic!("expected a scripted POST, found {other:?} or queue exhausted"),
        }
    }

    fn put_file(&self, _url: &str, _tls_profile: &PutTlsProfile<'_>, _tls: &TlsOptions, _file: &Utf8Path) -> TransportResponse {
        self.log.borrow_mut().push("put");
        match self.calls.borrow_mut().pop_front() {
            Some(ScriptedCall::Put { http_status, transport_code }) => {
                TransportResponse { http_status, transport_code, body: Vec::new() }
            }
            other => panic!("expected a scripted PUT, found {other:?} or queue exhausted"),
        }
    }
}

/// A [`TelemetrySink`] fake that records every count/value call for assertions.
#[derive(Default)]
pub struct RecordingTelemetry {
    pub counts: RefCell<Vec<String>>,
    pub values: RefCell<Vec<(String, String)>>,
}

impl TelemetrySink for RecordingTelemetry {
    fn count(&self, name: &str) {
        self.counts.borrow_mut().push(name.to_string());
    }

    fn value(&self, name: &str, value: &str) {
        self.values.borrow_mut().push((name.to_string(), value.to_string()));
    }
}
