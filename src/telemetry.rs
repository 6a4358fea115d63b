//! Telemetry sink (C11): a named-counter and name=value event bus. Real deployments wire this to
//! the device's telemetry marker-file mechanism; tests and environments without a telemetry bus
//! get the no-op sink below.

use tracing::debug;

pub trait TelemetrySink: Send + Sync {
    /// Increment a named counter by one.
    fn count(&self, name: &str);

    /// Emit a `name=value` event.
    fn value(&self, name: &str, value: &str);
}

/// Default sink for environments with no telemetry bus configured: logs at debug level and drops
/// the event. Never fails, so callers can fire telemetry unconditionally.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn count(&self, name: &str) {
        debug!(telemetry.counter = name, "telemetry count (no-op sink)");
    }

    fn value(&self, name: &str, value: &str) {
        debug!(telemetry.name = name, telemetry.value = value, "telemetry value (no-op sink)");
    }
}

/// Well-known event/counter names used by the strategy workflows and upload pipeline.
pub mod names {
    pub const NO_LOGS_ON_DEMAND: &str = "NoLogsOnDemand";
    pub const NO_LOGS_REBOOT: &str = "NoLogsReboot";
    pub const PRIVACY_ABORT: &str = "PrivacyOptOutAbort";
    pub const DRI_LOG_UPLOAD: &str = "SYST_INFO_PDRILogUpload";
    pub const UPLOAD_ATTEMPT: &str = "STBLogUL_UploadAttempt";
    pub const CERT_ERR_SPLIT: &str = "certerr_split";
}
