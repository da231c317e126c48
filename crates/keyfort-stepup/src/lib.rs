//! keyfort-stepup: the TOTP second factor gating high-sensitivity entries.
//!
//! Independent of the master-key scheme: enabling, unlocking, and
//! disabling never touch vault ciphertexts. The shared secret lives
//! server-side, encrypted under an operator-provided application key, and
//! an unlock is a timestamp that expires by arithmetic — there is no
//! background timer.

pub mod app_key;
pub mod gate;
pub mod totp;

pub use app_key::{find_app_key, AppKey};
pub use gate::{StepUpGate, StepUpSetup, StepUpStatus};
pub use totp::{generate_secret, provisioning_uri, verify_code};
