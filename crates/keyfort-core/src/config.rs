use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from keyfort.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyfortConfig {
    pub kdf: KdfConfig,
    pub stepup: StepUpConfig,
    pub telemetry: TelemetryConfig,
}

/// Master-key derivation parameters.
///
/// The iteration count is deliberately high: the human-facing secret is a
/// short numeric code, so the root derivation carries the entire
/// brute-force cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// PBKDF2-HMAC-SHA256 iterations for the root derivation (default: 600000)
    pub iterations: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            iterations: 600_000,
        }
    }
}

/// Step-up (TOTP) gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepUpConfig {
    /// How long an unlock stays valid, in seconds (default: 300)
    pub unlock_duration_secs: u64,
    /// TOTP time step in seconds (default: 30)
    pub totp_step_secs: u64,
    /// Accepted clock-skew window, in steps either side of now (default: 2)
    pub totp_skew_steps: u64,
    /// Issuer label embedded in provisioning URIs
    pub issuer: String,
    /// Path to the operator-provided application key file (32 bytes, hex).
    /// Used only to encrypt TOTP shared secrets at rest.
    pub app_key_file: Option<PathBuf>,
}

impl Default for StepUpConfig {
    fn default() -> Self {
        Self {
            unlock_duration_secs: 300,
            totp_step_secs: 30,
            totp_skew_steps: 2,
            issuer: "Keyfort".into(),
            app_key_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}
