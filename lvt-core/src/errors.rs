//! Error types for `lvt_core`.
//!
//! Every failure inside the acquisition pipeline is funnelled through
//! [`LvtError`]. The variants follow the failure taxonomy the pipeline
//! reacts to. During enrichment each one is a soft failure for the framework
//! step that raised it.

use thiserror::Error;

/// Top-level error type for the `lvt_core` library.
#[derive(Debug, Error)]
pub enum LvtError {
    /// The target process or window could not be opened or enumerated.
    #[error("TargetUnreachable: {0}")]
    TargetUnreachable(String),

    /// Bitness mismatch, missing instrumentation artifact or ABI mismatch.
    #[error("CapabilityMismatch: {0}")]
    CapabilityMismatch(String),

    /// Endpoint creation, connect or read failure.
    #[error("TransportError: {0}")]
    Transport(String),

    /// A bounded wait expired.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The instrumentation module could not be started inside the target.
    #[error("InjectionError: {0}")]
    Injection(String),

    /// The payload was empty or could not be parsed.
    #[error("PayloadError: {0}")]
    Payload(String),

    /// A plugin violated the ABI contract.
    #[error("PluginError: {0}")]
    Plugin(String),

    /// Win32 / COM HRESULT failure.
    #[error("ComError: {0}")]
    Com(String),

    /// File-system failure (sidecar files, runtime configuration, logs).
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}

impl LvtError {
    /// Whether this failure is expected on machines lacking optional
    /// artifacts and should stay at debug level.
    pub fn is_capability(&self) -> bool {
        matches!(self, LvtError::CapabilityMismatch(_))
    }
}

impl From<serde_json::Error> for LvtError {
    fn from(err: serde_json::Error) -> Self {
        LvtError::Payload(format!("malformed JSON payload: {err}"))
    }
}

/// Convert a `windows::core::Error` (COM / Win32 HRESULT failure) into a
/// `LvtError::Com`.
#[cfg(windows)]
impl From<windows::core::Error> for LvtError {
    fn from(err: windows::core::Error) -> Self {
        LvtError::Com(format!("Windows error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_prefixed_by_class() {
        let err = LvtError::Transport("pipe closed".into());
        assert_eq!(err.to_string(), "TransportError: pipe closed");
        let err = LvtError::Timeout("connect".into());
        assert!(err.to_string().starts_with("Timeout: "));
    }

    #[test]
    fn test_json_error_maps_to_payload() {
        let parse = serde_json::from_str::<serde_json::Value>("[{").unwrap_err();
        let err: LvtError = parse.into();
        assert!(matches!(err, LvtError::Payload(_)));
    }

    #[test]
    fn test_capability_classification() {
        assert!(LvtError::CapabilityMismatch("x".into()).is_capability());
        assert!(!LvtError::Plugin("x".into()).is_capability());
    }
}
