//! RFC 4226/6238 time-based one-time passwords.
//!
//! HMAC-SHA1, 30-second steps, 6 digits — what every authenticator app
//! speaks. Validation accepts a configurable number of steps either side
//! of now; authenticator clocks drift and users type slowly.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use keyfort_core::{KeyfortError, KeyfortResult};

/// Entropy of a generated shared secret, per RFC 4226 §4 (160 bits)
const SECRET_BYTES: usize = 20;

/// Code length expected from authenticator apps
pub const CODE_DIGITS: usize = 6;

/// Generate a fresh shared secret, base32-encoded for provisioning.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    data_encoding::BASE32_NOPAD.encode(&bytes)
}

/// Build the otpauth:// provisioning URI an authenticator app consumes
/// (usually rendered as a QR code by the caller).
pub fn provisioning_uri(issuer: &str, account: &str, secret_b32: &str, step_secs: u64) -> String {
    let issuer_enc = urlencoding::encode(issuer);
    let account_enc = urlencoding::encode(account);
    format!(
        "otpauth://totp/{issuer_enc}:{account_enc}?secret={secret_b32}&issuer={issuer_enc}&algorithm=SHA1&digits={CODE_DIGITS}&period={step_secs}"
    )
}

/// The code for a specific counter value (exposed for tests and for
/// display-side tooling; validation should go through [`verify_code`]).
pub fn code_at(secret_b32: &str, unix_time: u64, step_secs: u64) -> KeyfortResult<String> {
    let key = decode_secret(secret_b32)?;
    let counter = unix_time / step_secs.max(1);
    Ok(format_code(hotp(&key, counter)))
}

/// Validate a submitted code against the shared secret within the skew
/// window. Returns `Ok(false)` for a well-formed but wrong code; the
/// caller maps that to the generic authentication failure.
pub fn verify_code(
    secret_b32: &str,
    submitted: &str,
    unix_time: u64,
    step_secs: u64,
    skew_steps: u64,
) -> KeyfortResult<bool> {
    let cleaned: String = submitted.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() != CODE_DIGITS || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyfortError::InvalidInput(format!(
            "code must be {CODE_DIGITS} digits"
        )));
    }

    let key = decode_secret(secret_b32)?;
    let step = step_secs.max(1);
    let center = unix_time / step;

    let lo = center.saturating_sub(skew_steps);
    let hi = center + skew_steps;
    for counter in lo..=hi {
        if format_code(hotp(&key, counter)) == cleaned {
            return Ok(true);
        }
    }
    Ok(false)
}

fn decode_secret(secret_b32: &str) -> KeyfortResult<Vec<u8>> {
    let normalized: String = secret_b32
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    data_encoding::BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|_| KeyfortError::InvalidInput("malformed base32 TOTP secret".into()))
}

/// RFC 4226 HOTP: HMAC-SHA1 over the big-endian counter, dynamically
/// truncated to 31 bits.
fn hotp(key: &[u8], counter: u64) -> u32 {
    let mut mac =
        <Hmac<Sha1> as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    binary % 1_000_000
}

fn format_code(value: u32) -> String {
    format!("{value:06}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 Appendix B test secret ("12345678901234567890" in base32)
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_rfc6238_vectors() {
        // SHA1 reference values from RFC 6238 Appendix B, truncated to
        // 6 digits.
        assert_eq!(code_at(RFC_SECRET, 59, 30).unwrap(), "287082");
        assert_eq!(code_at(RFC_SECRET, 1111111109, 30).unwrap(), "081804");
        assert_eq!(code_at(RFC_SECRET, 1234567890, 30).unwrap(), "005924");
        assert_eq!(code_at(RFC_SECRET, 2000000000, 30).unwrap(), "279037");
    }

    #[test]
    fn test_verify_current_code() {
        let now = 1_700_000_000;
        let code = code_at(RFC_SECRET, now, 30).unwrap();
        assert!(verify_code(RFC_SECRET, &code, now, 30, 2).unwrap());
    }

    #[test]
    fn test_verify_within_skew() {
        let now = 1_700_000_000;
        // A code from one step ago still validates.
        let stale = code_at(RFC_SECRET, now - 30, 30).unwrap();
        assert!(verify_code(RFC_SECRET, &stale, now, 30, 1).unwrap());
    }

    #[test]
    fn test_verify_outside_skew() {
        let now = 1_700_000_000;
        let ancient = code_at(RFC_SECRET, now - 300, 30).unwrap();
        assert!(!verify_code(RFC_SECRET, &ancient, now, 30, 1).unwrap());
    }

    #[test]
    fn test_verify_tolerates_spaces() {
        let now = 1_700_000_000;
        let code = code_at(RFC_SECRET, now, 30).unwrap();
        let spaced = format!("{} {}", &code[..3], &code[3..]);
        assert!(verify_code(RFC_SECRET, &spaced, now, 30, 1).unwrap());
    }

    #[test]
    fn test_malformed_code_rejected() {
        assert!(matches!(
            verify_code(RFC_SECRET, "12345", 0, 30, 1),
            Err(KeyfortError::InvalidInput(_))
        ));
        assert!(matches!(
            verify_code(RFC_SECRET, "12345a", 0, 30, 1),
            Err(KeyfortError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_generated_secrets_are_unique_base32() {
        let s1 = generate_secret();
        let s2 = generate_secret();
        assert_ne!(s1, s2);
        assert!(data_encoding::BASE32_NOPAD.decode(s1.as_bytes()).is_ok());
    }

    #[test]
    fn test_provisioning_uri_shape() {
        let uri = provisioning_uri("Keyfort", "user@example.com", "ABC234", 30);
        assert!(uri.starts_with("otpauth://totp/Keyfort:user%40example.com?"));
        assert!(uri.contains("secret=ABC234"));
        assert!(uri.contains("issuer=Keyfort"));
        assert!(uri.contains("period=30"));
    }
}
