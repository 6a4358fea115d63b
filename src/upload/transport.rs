//! Network-transport primitives (§1 "deliberately out of scope as bespoke implementations" —
//! only the interface is specified). [`Transport`] is the seam: [`ReqwestTransport`] is the real
//! `reqwest`-backed implementation used by the binary; tests substitute a fake that returns
//! scripted `(http_status, transport_code)` pairs, matching SPEC_FULL.md §4.4's wire shape without
//! exercising a real TLS stack.

use std::time::Duration;

use camino::Utf8Path;

use crate::context::Channel;

/// The outcome of one HTTP call at the transport layer: either the server was reached (nonzero
/// `http_status`, `transport_code == 0`) or it wasn't (`transport_code != 0`, the original C
/// agent's libcurl-style error code; see [`crate::error::AgentError::CERTIFICATE_ERROR_CODES`]).
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub http_status: u16,
    pub transport_code: i32,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Stage A credentials: mTLS triad for Direct, bearer token for CodeBig (§4.4).
pub enum StageAAuth<'a> {
    Direct {
        client_cert: &'a Utf8Path,
        client_key: &'a Utf8Path,
        ca_bundle: &'a Utf8Path,
    },
    CodeBig {
        bearer_token: &'a str,
    },
}

/// Stage B / proxy-PUT TLS profile: mTLS on Direct, plain TLS on CodeBig (§4.4).
pub enum PutTlsProfile<'a> {
    Mtls {
        client_cert: &'a Utf8Path,
        client_key: &'a Utf8Path,
        ca_bundle: &'a Utf8Path,
    },
    Plain,
}

#[derive(Debug, Clone, Copy)]
pub struct TlsOptions {
    pub ocsp_stapling: bool,
    pub request_timeout: Duration,
    pub handshake_timeout: Duration,
}

/// One network call per method; the upload pipeline (C8) is the only caller. Grounded on the
/// request/response wrapping style of `pageserver::client::mgmt_api::Client`, adapted to a
/// blocking, two-stage presign+PUT shape instead of that crate's JSON management API.
pub trait Transport {
    /// Stage A: form-encoded POST carrying the archive's basename and, when present, its
    /// Base64(MD5). Returns the raw response; the caller parses the presigned URL out of the body.
    fn post_presign(
        &self,
        url: &str,
        auth: &StageAAuth<'_>,
        tls: &TlsOptions,
        filename: &str,
        md5_base64: Option<&str>,
    ) -> TransportResponse;

    /// Stage B (or the proxy-fallback PUT, which reuses this same method with a rewritten URL).
    fn put_file(&self, url: &str, tls_profile: &PutTlsProfile<'_>, tls: &TlsOptions, file: &Utf8Path) -> TransportResponse;
}

/// `reqwest`-backed implementation. One blocking client per call, matching the agent's
/// single-invocation, single-thread scheduling model (§5) — there is no connection pool to keep
/// warm across invocations.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    fn build_client(&self, tls: &TlsOptions, profile: ClientProfile<'_>) -> reqwest::Result<reqwest::blocking::Client> {
        let mut builder = reqwest::blocking::Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .connect_timeout(tls.handshake_timeout)
            .timeout(tls.request_timeout);

        if let ClientProfile::Mtls { client_cert, client_key, ca_bundle } = profile {
            let mut pem = std::fs::read(client_cert.as_std_path()).unwrap_or_default();
            pem.extend(std::fs::read(client_key.as_std_path()).unwrap_or_default());
            if let Ok(identity) = reqwest::Identity::from_pem(&pem) {
                builder = builder.identity(identity);
            }
            if let Ok(ca_bytes) = std::fs::read(ca_bundle.as_std_path()) {
                if let Ok(cert) = reqwest::Certificate::from_pem(&ca_bytes) {
                    builder = builder.add_root_certificate(cert);
                }
            }
        }

        // OCSP stapling is not configurable through `reqwest`'s public builder; the setting is
        // threaded through so a future transport swap (e.g. a raw `rustls` client) can honor it.
        let _ = tls.ocsp_stapling;

        builder.build()
    }
}

enum ClientProfile<'a> {
    Mtls {
        client_cert: &'a Utf8Path,
        client_key: &'a Utf8Path,
        ca_bundle: &'a Utf8Path,
    },
    Plain,
}

impl Transport for ReqwestTransport {
    fn post_presign(
        &self,
        url: &str,
        auth: &StageAAuth<'_>,
        tls: &TlsOptions,
        filename: &str,
        md5_base64: Option<&str>,
    ) -> TransportResponse {
        let profile = match auth {
            StageAAuth::Direct { client_cert, client_key, ca_bundle } => ClientProfile::Mtls {
                client_cert,
                client_key,
                ca_bundle,
            },
            StageAAuth::CodeBig { .. } => ClientProfile::Plain,
        };
        let client = match self.build_client(tls, profile) {
            Ok(c) => c,
            Err(e) => return TransportResponse { http_status: 0, transport_code: classify_reqwest_error(&e), body: Vec::new() },
        };

        let mut form: Vec<(&str, &str)> = vec![("filename", filename)];
        if let Some(md5) = md5_base64 {
            form.push(("MD5", md5));
        }

        let mut req = client.post(url).form(&form);
        if let StageAAuth::CodeBig { bearer_token } = auth {
            req = req.bearer_auth(bearer_token);
        }

        match req.send() {
            Ok(resp) => {
                let http_status = resp.status().as_u16();
                let body = resp.bytes().map(|b| b.to_vec()).unwrap_or_default();
                TransportResponse { http_status, transport_code: 0, body }
            }
            Err(e) => TransportResponse { http_status: 0, transport_code: classify_reqwest_error(&e), body: Vec::new() },
        }
    }

    fn put_file(&self, url: &str, tls_profile: &PutTlsProfile<'_>, tls: &TlsOptions, file: &Utf8Path) -> TransportResponse {
        let profile = match tls_profile {
            PutTlsProfile::Mtls { client_cert, client_key, ca_bundle } => ClientProfile::Mtls {
                client_cert,
                client_key,
                ca_bundle,
            },
            PutTlsProfile::Plain => ClientProfile::Plain,
        };
        let client = match self.build_client(tls, profile) {
            Ok(c) => c,
            Err(e) => return TransportResponse { http_status: 0, transport_code: classify_reqwest_error(&e), body: Vec::new() },
        };

        let bytes = match std::fs::read(file.as_std_path()) {
            Ok(b) => b,
            Err(_) => return TransportResponse { http_status: 0, transport_code: 1, body: Vec::new() },
        };

        match client.put(url).body(bytes).send() {
            Ok(resp) => {
                let http_status = resp.status().as_u16();
                TransportResponse { http_status, transport_code: 0, body: Vec::new() }
            }
            Err(e) => TransportResponse { http_status: 0, transport_code: classify_reqwest_error(&e), body: Vec::new() },
        }
    }
}

/// Approximate a libcurl-style transport error code from a `reqwest::Error`, so the
/// certificate-error table in `error.rs` (lifted verbatim from the original C agent's
/// `verification.c`) still applies to the Rust transport. Connect/timeout failures that aren't
/// TLS-specific fall back to a generic nonzero code (network failure, not a certificate problem).
fn classify_reqwest_error(err: &reqwest::Error) -> i32 {
    if err.is_timeout() {
        return 28; // CURLE_OPERATION_TIMEDOUT
    }
    if is_tls_error(err) {
        return 35; // CURLE_SSL_CONNECT_ERROR
    }
    if err.is_connect() {
        return 7; // CURLE_COULDNT_CONNECT
    }
    1
}

/// `reqwest::Error` does not expose a typed "is TLS" predicate; inspect the source chain for the
/// TLS backend's error type name as a best-effort classifier.
fn is_tls_error(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(s) = source {
        let desc = s.to_string().to_ascii_lowercase();
        if desc.contains("tls") || desc.contains("certificate") || desc.contains("x509") {
            return true;
        }
        source = s.source();
    }
    false
}

/// Channel-appropriate [`StageAAuth`] given the device's configured certificate triad / bearer
/// token.
pub fn stage_a_auth<'a>(
    channel: Channel,
    client_cert: &'a Utf8Path,
    client_key: &'a Utf8Path,
    ca_bundle: &'a Utf8Path,
    bearer_token: &'a str,
) -> StageAAuth<'a> {
    match channel {
        Channel::Direct => StageAAuth::Direct { client_cert, client_key, ca_bundle },
        Channel::CodeBig => StageAAuth::CodeBig { bearer_token },
    }
}

/// Channel-appropriate [`PutTlsProfile`] for Stage B / proxy PUT (§4.4: Direct always uses mTLS,
/// including for the proxy PUT; CodeBig uses plain TLS).
pub fn put_tls_profile<'a>(
    channel: Channel,
    client_cert: &'a Utf8Path,
    client_key: &'a Utf8Path,
    ca_bundle: &'a Utf8Path,
) -> PutTlsProfile<'a> {
    match channel {
        Channel::Direct => PutTlsProfile::Mtls { client_cert, client_key, ca_bundle },
        Channel::CodeBig => PutTlsProfile::Plain,
    }
}
