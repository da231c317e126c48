//! Application key: the operator-provided 32-byte key that encrypts TOTP
//! shared secrets at rest.
//!
//! This key belongs to the deployment, not to any user — rotating it
//! re-encrypts only `secret_enc` fields, never user vault data.
//!
//! Discovery chain (in order of precedence):
//!   1. $KEYFORT_APP_KEY        (literal hex key in env var)
//!   2. $KEYFORT_APP_KEY_FILE   (path to a hex key file)
//!   3. config `stepup.app_key_file`

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::Zeroize;

use keyfort_core::config::StepUpConfig;
use keyfort_core::{KeyfortError, KeyfortResult};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// The at-rest key. Zeroized on drop, redacted in debug output.
#[derive(Clone)]
pub struct AppKey {
    bytes: [u8; KEY_SIZE],
}

impl AppKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_hex(hex_str: &str) -> KeyfortResult<Self> {
        let raw = hex::decode(hex_str.trim())
            .map_err(|_| KeyfortError::Config("application key is not valid hex".into()))?;
        let bytes: [u8; KEY_SIZE] = raw.try_into().map_err(|_| {
            KeyfortError::Config(format!("application key must be {KEY_SIZE} bytes"))
        })?;
        Ok(Self { bytes })
    }

    /// Encrypt a TOTP shared secret for storage. Output format:
    /// `base64(nonce):base64(ciphertext)`.
    pub fn seal(&self, plaintext: &str) -> KeyfortResult<String> {
        let cipher = Aes256Gcm::new(&self.bytes.into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| KeyfortError::Other(anyhow::anyhow!("at-rest encryption failed")))?;

        Ok(format!(
            "{}:{}",
            b64_encode(&nonce_bytes),
            b64_encode(&ciphertext)
        ))
    }

    /// Decrypt a stored TOTP shared secret.
    pub fn open(&self, sealed: &str) -> KeyfortResult<String> {
        let (nonce_b64, ct_b64) = sealed
            .split_once(':')
            .ok_or_else(|| KeyfortError::InvalidInput("malformed sealed secret".into()))?;

        let nonce = b64_decode(nonce_b64)?;
        if nonce.len() != NONCE_SIZE {
            return Err(KeyfortError::InvalidInput("malformed sealed secret".into()));
        }
        let ciphertext = b64_decode(ct_b64)?;

        let cipher = Aes256Gcm::new(&self.bytes.into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| KeyfortError::DecryptionFailure)?;

        String::from_utf8(plaintext).map_err(|_| KeyfortError::DecryptionFailure)
    }
}

impl Drop for AppKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for AppKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Discover and load the application key using the priority chain.
pub fn find_app_key(config: &StepUpConfig) -> KeyfortResult<AppKey> {
    // 1. Literal key in env var
    if let Ok(literal) = std::env::var("KEYFORT_APP_KEY") {
        if !literal.is_empty() {
            tracing::debug!(source = "KEYFORT_APP_KEY (env)", "application key loaded");
            return AppKey::from_hex(&literal);
        }
    }

    // 2. Key file path in env var
    if let Ok(key_file) = std::env::var("KEYFORT_APP_KEY_FILE") {
        if !key_file.is_empty() {
            let content = std::fs::read_to_string(&key_file)?;
            tracing::debug!(source = %key_file, "application key loaded");
            return AppKey::from_hex(&content);
        }
    }

    // 3. Explicit config path
    if let Some(path) = &config.app_key_file {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            tracing::debug!(source = %path.display(), "application key loaded");
            return AppKey::from_hex(&content);
        }
    }

    Err(KeyfortError::Config(
        "no application key found. Tried: $KEYFORT_APP_KEY, $KEYFORT_APP_KEY_FILE, \
         and stepup.app_key_file"
            .into(),
    ))
}

fn b64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

fn b64_decode(s: &str) -> KeyfortResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD
        .decode(s)
        .map_err(|_| KeyfortError::InvalidInput("malformed base64 value".into()))
}
