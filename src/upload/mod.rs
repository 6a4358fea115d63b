//! Upload Pipeline (C8): one upload *attempt* is Stage A (presign POST) optionally followed by
//! Stage B (S3 PUT) and, on Direct, an optional proxy-PUT fallback. Grounded on SPEC_FULL.md §4.4
//! and the request/response wrapping style of `pageserver::client::mgmt_api::Client`.

pub mod transport;

use std::fs;

use anyhow::{Context, Result};
use camino::Utf8Path;
use md5::{Digest, Md5};
use tracing::{info, instrument, warn};
use url::Url;

use crate::context::{Channel, RuntimeContext};
use crate::error::AgentError;
use crate::session::Session;
use crate::telemetry::{names, TelemetrySink};
use self::transport::{put_tls_profile, stage_a_auth, PutTlsProfile, TlsOptions, Transport};

/// `md5sum(file) | base64`, no trailing newline (§4.4). Returns `None` on any I/O failure rather
/// than failing the call — an MD5 field is an optional enrichment of Stage A, never a requirement.
pub fn md5_base64(path: &Utf8Path) -> Option<String> {
    let bytes = fs::read(path.as_std_path()).ok()?;
    let mut hasher = Md5::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    Some(base64::encode(digest))
}

/// The result of one Stage-A call, which is all the retry controller needs to decide whether to
/// loop: either Stage A itself failed (Stage B never ran, so a retry is meaningful), or Stage A
/// succeeded and the attempt is fully resolved by whatever Stage B / proxy did (so no further
/// Stage-A retry on this channel is meaningful; see §4.4's ordering contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    StageAFailed,
    Resolved { success: bool },
}

/// Run one upload attempt on `channel` against `archive_path`. Stage A is always attempted once;
/// Stage B (and, if applicable, the proxy PUT) run only if Stage A succeeds.
#[instrument(skip(ctx, session, telemetry, transport), fields(channel = channel.as_str()))]
pub fn attempt(
    ctx: &RuntimeContext,
    session: &mut Session,
    channel: Channel,
    archive_path: &Utf8Path,
    telemetry: &dyn TelemetrySink,
    transport: &dyn Transport,
) -> Result<AttemptOutcome> {
    let filename = archive_path
        .file_name()
        .ok_or_else(|| AgentError::InvalidArgument("archive path has no filename".into()))?;

    let md5 = if ctx.settings.encrypt_cloud_upload {
        md5_base64(archive_path)
    } else {
        None
    };

    let tls = TlsOptions {
        ocsp_stapling: ctx.settings.ocsp_enabled,
        request_timeout: ctx.retry_policy.http_timeout,
        handshake_timeout: ctx.retry_policy.tls_handshake_timeout,
    };

    let auth = stage_a_auth(
        channel,
        &ctx.certs.client_cert,
        &ctx.certs.client_key,
        &ctx.certs.ca_bundle,
        &ctx.endpoints.codebig_bearer_token,
    );

    let stage_a = transport.post_presign(&ctx.endpoints.upload_url, &auth, &tls, filename, md5.as_deref());
    telemetry.count(names::UPLOAD_ATTEMPT);
    report_certificate_error(ctx, telemetry, stage_a.transport_code, &ctx.endpoints.upload_url);

    let presigned_url = if stage_a.transport_code == 0 && stage_a.http_status == 200 {
        parse_presigned_url(&stage_a.body_str())
    } else {
        None
    };

    session.record_attempt(channel, stage_a.http_status, stage_a.transport_code);

    let Some(presigned_url) = presigned_url else {
        warn!(http = stage_a.http_status, transport_code = stage_a.transport_code, "stage A failed");
        return Ok(AttemptOutcome::StageAFailed);
    };

    persist_presigned_url(ctx, &presigned_url)?;
    session.presigned_url = Some(presigned_url.clone());

    let put_profile = put_tls_profile(channel, &ctx.certs.client_cert, &ctx.certs.client_key, &ctx.certs.ca_bundle);
    let stage_b = transport.put_file(&presigned_url, &put_profile, &tls, archive_path);
    report_certificate_error(ctx, telemetry, stage_b.transport_code, host_of(&presigned_url).as_deref().unwrap_or(""));

    if stage_b.transport_code == 0 && stage_b.http_status == 200 {
        info!("stage B succeeded");
        return Ok(AttemptOutcome::Resolved { success: true });
    }
    warn!(http = stage_b.http_status, transport_code = stage_b.transport_code, "stage B failed");

    if !proxy_fallback_eligible(ctx, channel) {
        return Ok(AttemptOutcome::Resolved { success: false });
    }

    let proxy_url = match proxy_url_for(ctx, &presigned_url) {
        Some(url) => url,
        None => return Ok(AttemptOutcome::Resolved { success: false }),
    };

    let proxy_result = transport.put_file(&proxy_url, &put_profile, &tls, archive_path);
    telemetry.count("proxy_fallback_attempt");
    report_certificate_error(ctx, telemetry, proxy_result.transport_code, host_of(&proxy_url).as_deref().unwrap_or(""));

    let success = proxy_result.transport_code == 0 && proxy_result.http_status == 200;
    if success {
        info!("proxy fallback PUT succeeded");
    } else {
        warn!(http = proxy_result.http_status, transport_code = proxy_result.transport_code, "proxy fallback PUT failed");
    }
    Ok(AttemptOutcome::Resolved { success })
}

/// §4.4 proxy fallback eligibility: Direct channel only, media-client device, non-empty proxy
/// bucket hostname configured.
fn proxy_fallback_eligible(ctx: &RuntimeContext, channel: Channel) -> bool {
    channel == Channel::Direct
        && ctx.identity.is_media_client()
        && ctx
            .endpoints
            .proxy_bucket_host
            .as_deref()
            .is_some_and(|host| !host.is_empty())
}

/// Rewrite the presigned S3 URL's path onto the proxy bucket host (§4.4). Uses the in-memory copy
/// of the URL, per §9 Open Question 1 — the on-disk sidecar is written for external consumers but
/// never re-read by this process.
fn proxy_url_for(ctx: &RuntimeContext, presigned_url: &str) -> Option<String> {
    let parsed = Url::parse(presigned_url).ok()?;
    let host = ctx.endpoints.proxy_bucket_host.as_deref()?;
    Some(format!("https://{host}{}", parsed.path()))
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

/// The server's Stage-A response body is a single line containing the presigned URL.
fn parse_presigned_url(body: &str) -> Option<String> {
    let line = body.lines().next()?.trim();
    Url::parse(line).ok()?;
    Some(line.to_string())
}

/// Persist the presigned URL to `/tmp/httpresult.txt` (§6) for external consumers that expect the
/// legacy sidecar to exist, even though this process never reads it back.
fn persist_presigned_url(ctx: &RuntimeContext, url: &str) -> Result<()> {
    fs::write(ctx.sidecars.presigned_url_sidecar.as_std_path(), format!("{url}\n"))
        .with_context(|| format!("writing presigned-url sidecar {}", ctx.sidecars.presigned_url_sidecar))
}

/// §7 `CertificateError`: certain transport codes additionally emit `certerr_split` telemetry.
fn report_certificate_error(ctx: &RuntimeContext, telemetry: &dyn TelemetrySink, transport_code: i32, host: &str) {
    let _ = ctx;
    if transport_code != 0 && AgentError::is_certificate_error(transport_code) {
        telemetry.value(names::CERT_ERR_SPLIT, &format!("STBLogUL, {transport_code}, {host}"));
    }
}
