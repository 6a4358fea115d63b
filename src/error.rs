//! Crate-wide typed error leaves. Phase functions return `anyhow::Result<()>` and attach
//! `.context(...)` at each fallible step; `AgentError` is what those chains bottom out in whenever
//! the workflow engine or retry controller needs to branch on *kind* rather than just log and bail.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("required path missing: {path} ({detail})")]
    FilesystemMissing { path: PathBuf, detail: String },

    #[error("transport error (code {code})")]
    Transport { code: i32 },

    #[error("TLS/certificate error (code {code}) talking to {host}")]
    Certificate { code: i32, host: String },

    #[error("terminal HTTP status {status}")]
    HttpTerminal { status: u16 },

    #[error("retryable HTTP status {status}")]
    HttpRetryable { status: u16 },

    #[error("both upload channels are blocked")]
    UploadBlocked,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Transport error codes that indicate a certificate or TLS-handshake problem rather than a plain
/// network failure. Mirrors the original `verification.c` table.
pub const CERTIFICATE_ERROR_CODES: &[i32] =
    &[35, 51, 53, 54, 58, 59, 60, 64, 66, 77, 80, 82, 83, 90, 91];

impl AgentError {
    pub fn is_certificate_error(code: i32) -> bool {
        CERTIFICATE_ERROR_CODES.contains(&code)
    }

    /// Classify a raw (transport_code, http_status) pair the way §4.4/§7 require.
    pub fn classify(transport_code: i32, http_status: u16, host: &str) -> Option<AgentError> {
        if transport_code != 0 {
            if AgentError::is_certificate_error(transport_code) {
                return Some(AgentError::Certificate {
                    code: transport_code,
                    host: host.to_string(),
                });
            }
            return Some(AgentError::Transport {
                code: transport_code,
            });
        }
        match http_status {
            200 => None,
            404 => Some(AgentError::HttpTerminal { status: 404 }),
            other => Some(AgentError::HttpRetryable { status: other }),
        }
    }
}
