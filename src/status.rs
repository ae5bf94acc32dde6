use serde::{Serialize, Serializer};
use std::fmt;

/// Device status summary.
///
/// Exactly one value is current at any time. The scheduler overwrites it every
/// cycle; fatal startup events overwrite it once before the daemon exits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SystemStatus {
    #[default]
    Initializing,
    CameraReady,
    Running,
    Scanning,
    Detection(String),
    CameraInitFailed,
    MemoryError,
    CaptureError,
    InferenceError,
    WiFiFailed,
}

impl SystemStatus {
    /// True for the error states.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SystemStatus::CameraInitFailed
                | SystemStatus::MemoryError
                | SystemStatus::CaptureError
                | SystemStatus::InferenceError
                | SystemStatus::WiFiFailed
        )
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemStatus::Initializing => f.write_str("Initializing"),
            SystemStatus::CameraReady => f.write_str("Camera Ready"),
            SystemStatus::Running => f.write_str("Running"),
            SystemStatus::Scanning => f.write_str("Scanning..."),
            SystemStatus::Detection(label) => write!(f, "Detection: {}", label),
            SystemStatus::CameraInitFailed => f.write_str("Camera Init Failed"),
            SystemStatus::MemoryError => f.write_str("Memory Error"),
            SystemStatus::CaptureError => f.write_str("Capture Error"),
            SystemStatus::InferenceError => f.write_str("Inference Error"),
            SystemStatus::WiFiFailed => f.write_str("WiFi Failed"),
        }
    }
}

impl Serialize for SystemStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_status_carries_label() {
        let status = SystemStatus::Detection("switch".to_string());
        assert_eq!(status.to_string(), "Detection: switch");
        assert!(!status.is_error());
    }

    #[test]
    fn error_states_are_flagged() {
        for status in [
            SystemStatus::CameraInitFailed,
            SystemStatus::MemoryError,
            SystemStatus::CaptureError,
            SystemStatus::InferenceError,
            SystemStatus::WiFiFailed,
        ] {
            assert!(status.is_error(), "{} should be an error", status);
        }
        assert!(!SystemStatus::Scanning.is_error());
    }

    #[test]
    fn serializes_as_display_string() {
        let json = serde_json::to_string(&SystemStatus::CameraReady).unwrap();
        assert_eq!(json, r#""Camera Ready""#);
    }
}
