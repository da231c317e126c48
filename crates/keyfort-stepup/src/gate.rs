//! The step-up gate: per-identity TOTP state machine.
//!
//! `Disabled -> PendingVerification -> Enabled&Locked <-> Enabled&Unlocked`
//!
//! Setup stores the shared secret (encrypted, disabled) until the first
//! successful verification flips it on. Unlocking stamps a timestamp;
//! the unlock expires `unlock_duration_secs` later by pure arithmetic,
//! re-checked on every status read.

use chrono::{DateTime, Utc};

use keyfort_core::config::StepUpConfig;
use keyfort_core::types::StepUpState;
use keyfort_core::{KeyfortError, KeyfortResult};

use crate::app_key::AppKey;
use crate::totp;

/// Result of starting setup: shown to the user once for enrollment.
#[derive(Debug, Clone)]
pub struct StepUpSetup {
    /// Base32 shared secret, for manual entry
    pub secret: String,
    /// otpauth:// URI, for QR rendering by the caller
    pub provisioning_uri: String,
}

/// Snapshot answered to status polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepUpStatus {
    pub enabled: bool,
    pub unlocked: bool,
}

pub struct StepUpGate {
    config: StepUpConfig,
    app_key: AppKey,
}

impl StepUpGate {
    pub fn new(config: StepUpConfig, app_key: AppKey) -> Self {
        Self { config, app_key }
    }

    /// Begin enrollment: generate a fresh shared secret, store it
    /// encrypted with `enabled = false`, and hand back the provisioning
    /// material. Re-running setup before confirmation replaces the
    /// pending secret; an enabled gate must be disabled first.
    pub fn setup(&self, state: &mut StepUpState, account: &str) -> KeyfortResult<StepUpSetup> {
        if state.enabled {
            return Err(KeyfortError::InvalidInput(
                "step-up is already enabled; disable it before re-enrolling".into(),
            ));
        }

        let secret = totp::generate_secret();
        state.secret_enc = Some(self.app_key.seal(&secret)?);
        state.unlocked_at = None;

        let uri = totp::provisioning_uri(
            &self.config.issuer,
            account,
            &secret,
            self.config.totp_step_secs,
        );
        tracing::info!("step-up enrollment started");

        Ok(StepUpSetup {
            secret,
            provisioning_uri: uri,
        })
    }

    /// First successful verification completes enrollment.
    pub fn confirm(
        &self,
        state: &mut StepUpState,
        code: &str,
        now: DateTime<Utc>,
    ) -> KeyfortResult<()> {
        if state.enabled {
            return Err(KeyfortError::InvalidInput(
                "step-up is already enabled".into(),
            ));
        }
        self.check_code(state, code, now)?;
        state.enabled = true;
        tracing::info!("step-up enabled");
        Ok(())
    }

    /// Open the unlock window from `now`. Valid for
    /// `unlock_duration_secs`; nothing clears it except `lock`,
    /// `disable`, or the passage of time.
    pub fn unlock(
        &self,
        state: &mut StepUpState,
        code: &str,
        now: DateTime<Utc>,
    ) -> KeyfortResult<()> {
        if !state.enabled {
            return Err(KeyfortError::NotReady("step-up is not enabled".into()));
        }
        self.check_code(state, code, now)?;
        state.unlocked_at = Some(now);
        tracing::debug!("step-up unlocked");
        Ok(())
    }

    /// Close the window immediately without disabling the factor.
    pub fn lock(&self, state: &mut StepUpState) {
        state.unlocked_at = None;
        tracing::debug!("step-up locked");
    }

    /// Turn the factor off: secret, enabled flag, and unlock timestamp
    /// all cleared in one mutation.
    pub fn disable(&self, state: &mut StepUpState) -> KeyfortResult<()> {
        if !state.enabled {
            return Err(KeyfortError::InvalidInput("step-up is not enabled".into()));
        }
        *state = StepUpState::default();
        tracing::info!("step-up disabled");
        Ok(())
    }

    /// Pure read, safe to poll. Unlock expiry happens here, by
    /// recomputation, not by any timer.
    pub fn status(&self, state: &StepUpState, now: DateTime<Utc>) -> StepUpStatus {
        StepUpStatus {
            enabled: state.enabled && state.secret_enc.is_some(),
            unlocked: state.is_unlocked(now, self.config.unlock_duration_secs),
        }
    }

    /// Re-encrypt the stored shared secret under a new application key.
    /// Touches nothing user-keyed, so operator key rotation never breaks
    /// vault data or verifiers.
    pub fn reencrypt_under(&self, state: &mut StepUpState, new_key: &AppKey) -> KeyfortResult<()> {
        if let Some(sealed) = &state.secret_enc {
            let secret = self.app_key.open(sealed)?;
            state.secret_enc = Some(new_key.seal(&secret)?);
        }
        Ok(())
    }

    fn check_code(
        &self,
        state: &StepUpState,
        code: &str,
        now: DateTime<Utc>,
    ) -> KeyfortResult<()> {
        let sealed = state
            .secret_enc
            .as_deref()
            .ok_or_else(|| KeyfortError::NotReady("step-up is not set up".into()))?;
        let secret = self.app_key.open(sealed)?;

        let valid = totp::verify_code(
            &secret,
            code,
            now.timestamp().max(0) as u64,
            self.config.totp_step_secs,
            self.config.totp_skew_steps,
        )?;
        if !valid {
            return Err(KeyfortError::AuthenticationFailure);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn gate() -> StepUpGate {
        StepUpGate::new(StepUpConfig::default(), AppKey::from_bytes([7u8; 32]))
    }

    fn valid_code(gate: &StepUpGate, state: &StepUpState, now: DateTime<Utc>) -> String {
        let sealed = state.secret_enc.as_deref().unwrap();
        let secret = AppKey::from_bytes([7u8; 32]).open(sealed).unwrap();
        let _ = gate;
        totp::code_at(&secret, now.timestamp() as u64, 30).unwrap()
    }

    fn enabled_state(gate: &StepUpGate, now: DateTime<Utc>) -> StepUpState {
        let mut state = StepUpState::default();
        gate.setup(&mut state, "user@example.com").unwrap();
        let code = valid_code(gate, &state, now);
        gate.confirm(&mut state, &code, now).unwrap();
        state
    }

    #[test]
    fn test_setup_stores_secret_encrypted_and_disabled() {
        let gate = gate();
        let mut state = StepUpState::default();

        let setup = gate.setup(&mut state, "user@example.com").unwrap();

        assert!(!state.enabled);
        let stored = state.secret_enc.as_deref().unwrap();
        // Never the raw base32 secret at rest.
        assert!(!stored.contains(&setup.secret));
        assert!(setup.provisioning_uri.starts_with("otpauth://totp/"));
    }

    #[test]
    fn test_confirm_enables() {
        let gate = gate();
        let now = Utc::now();
        let state = enabled_state(&gate, now);

        let status = gate.status(&state, now);
        assert!(status.enabled);
        assert!(!status.unlocked);
    }

    #[test]
    fn test_confirm_with_bad_code_stays_disabled() {
        let gate = gate();
        let mut state = StepUpState::default();
        gate.setup(&mut state, "user@example.com").unwrap();

        let result = gate.confirm(&mut state, "000000", Utc::now());
        assert!(matches!(result, Err(KeyfortError::AuthenticationFailure)));
        assert!(!state.enabled);
    }

    #[test]
    fn test_unlock_window_expires_by_time() {
        let gate = gate();
        let now = Utc::now();
        let mut state = enabled_state(&gate, now);

        let code = valid_code(&gate, &state, now);
        gate.unlock(&mut state, &code, now).unwrap();
        assert!(gate.status(&state, now).unlocked);

        // Still inside the five-minute window.
        assert!(gate.status(&state, now + Duration::seconds(299)).unlocked);
        // Expired without anyone calling lock().
        assert!(!gate.status(&state, now + Duration::seconds(301)).unlocked);
    }

    #[test]
    fn test_explicit_lock_is_immediate() {
        let gate = gate();
        let now = Utc::now();
        let mut state = enabled_state(&gate, now);

        let code = valid_code(&gate, &state, now);
        gate.unlock(&mut state, &code, now).unwrap();
        assert!(gate.status(&state, now).unlocked);

        gate.lock(&mut state);
        assert!(!gate.status(&state, now).unlocked);
        // Locking does not disable.
        assert!(gate.status(&state, now).enabled);
    }

    #[test]
    fn test_disable_clears_everything_atomically() {
        let gate = gate();
        let now = Utc::now();
        let mut state = enabled_state(&gate, now);
        let code = valid_code(&gate, &state, now);
        gate.unlock(&mut state, &code, now).unwrap();

        gate.disable(&mut state).unwrap();

        assert!(!state.enabled);
        assert!(state.secret_enc.is_none());
        assert!(state.unlocked_at.is_none());
    }

    #[test]
    fn test_disable_requires_enabled() {
        let gate = gate();
        let mut state = StepUpState::default();
        assert!(matches!(
            gate.disable(&mut state),
            Err(KeyfortError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_setup_rejected_while_enabled() {
        let gate = gate();
        let now = Utc::now();
        let mut state = enabled_state(&gate, now);

        assert!(matches!(
            gate.setup(&mut state, "user@example.com"),
            Err(KeyfortError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_unlock_requires_enabled() {
        let gate = gate();
        let mut state = StepUpState::default();
        gate.setup(&mut state, "user@example.com").unwrap();

        let result = gate.unlock(&mut state, "123456", Utc::now());
        assert!(matches!(result, Err(KeyfortError::NotReady(_))));
    }

    #[test]
    fn test_app_key_rotation_preserves_enrollment() {
        let gate = gate();
        let now = Utc::now();
        let mut state = enabled_state(&gate, now);

        let new_key = AppKey::from_bytes([9u8; 32]);
        gate.reencrypt_under(&mut state, &new_key).unwrap();

        // The rotated gate still validates codes from the same secret.
        let rotated_gate = StepUpGate::new(StepUpConfig::default(), new_key.clone());
        let secret = new_key.open(state.secret_enc.as_deref().unwrap()).unwrap();
        let code = totp::code_at(&secret, now.timestamp() as u64, 30).unwrap();
        rotated_gate.unlock(&mut state, &code, now).unwrap();
        assert!(rotated_gate.status(&state, now).unlocked);
    }
}
