//! Vault cipher: AES-256-GCM over individual secret fields.
//!
//! Every call draws a fresh random 96-bit nonce; ciphertext and nonce
//! travel as base64. Decryption fails closed: tamper, wrong key, and
//! corrupt data are all the same generic error with no partial output.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use keyfort_core::{KeyfortError, KeyfortResult};

use crate::kdf::ProtectionKey;
use crate::{b64_decode, b64_encode, KEY_SIZE, NONCE_SIZE};

/// One encrypted field as persisted: base64 ciphertext plus base64 nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    pub encrypted_data: String,
    pub iv: String,
}

/// Encrypt a plaintext field under the protection key.
///
/// Empty plaintext is valid and round-trips.
pub fn encrypt(plaintext: &str, key: &ProtectionKey) -> KeyfortResult<EncryptedField> {
    let (ciphertext, nonce) = aead_seal(key.as_bytes(), plaintext.as_bytes())?;
    Ok(EncryptedField {
        encrypted_data: b64_encode(&ciphertext),
        iv: b64_encode(&nonce),
    })
}

/// Decrypt a field. Any failure — bad tag, wrong key, corrupt data, or
/// non-UTF-8 plaintext — surfaces as the one generic decryption error.
pub fn decrypt(field: &EncryptedField, key: &ProtectionKey) -> KeyfortResult<String> {
    let ciphertext = b64_decode(&field.encrypted_data)?;
    let nonce = b64_decode(&field.iv)?;
    if nonce.len() != NONCE_SIZE {
        return Err(KeyfortError::InvalidInput(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        )));
    }

    let plaintext = aead_open(key.as_bytes(), &nonce, &ciphertext)?;
    String::from_utf8(plaintext).map_err(|_| KeyfortError::DecryptionFailure)
}

/// Raw AEAD seal, shared with the recovery escrow.
pub(crate) fn aead_seal(
    key_bytes: &[u8; KEY_SIZE],
    plaintext: &[u8],
) -> KeyfortResult<(Vec<u8>, [u8; NONCE_SIZE])> {
    let cipher = Aes256Gcm::new(key_bytes.into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| KeyfortError::Other(anyhow::anyhow!("AEAD encryption failed")))?;

    Ok((ciphertext, nonce_bytes))
}

/// Raw AEAD open. The library error is swallowed on purpose.
pub(crate) fn aead_open(
    key_bytes: &[u8; KEY_SIZE],
    nonce: &[u8],
    ciphertext: &[u8],
) -> KeyfortResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key_bytes.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| KeyfortError::DecryptionFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::RngCore;

    fn test_key() -> ProtectionKey {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        ProtectionKey::from_bytes(bytes)
    }

    #[test]
    fn test_roundtrip() {
        let key = test_key();
        let field = encrypt("hunter2", &key).unwrap();
        assert_eq!(decrypt(&field, &key).unwrap(), "hunter2");
    }

    #[test]
    fn test_empty_plaintext_roundtrips() {
        let key = test_key();
        let field = encrypt("", &key).unwrap();
        assert_eq!(decrypt(&field, &key).unwrap(), "");
    }

    #[test]
    fn test_unicode_roundtrips() {
        let key = test_key();
        let plaintext = "pärölä 密码 🔐";
        let field = encrypt(plaintext, &key).unwrap();
        assert_eq!(decrypt(&field, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let field = encrypt("hunter2", &test_key()).unwrap();
        let result = decrypt(&field, &test_key());
        assert!(matches!(result, Err(KeyfortError::DecryptionFailure)));
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let key = test_key();
        let f1 = encrypt("same plaintext", &key).unwrap();
        let f2 = encrypt("same plaintext", &key).unwrap();

        assert_ne!(f1.iv, f2.iv);
        assert_ne!(f1.encrypted_data, f2.encrypted_data);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key();
        let mut field = encrypt("hunter2", &key).unwrap();

        let mut raw = crate::b64_decode(&field.encrypted_data).unwrap();
        raw[0] ^= 0xFF;
        field.encrypted_data = crate::b64_encode(&raw);

        assert!(matches!(
            decrypt(&field, &key),
            Err(KeyfortError::DecryptionFailure)
        ));
    }

    #[test]
    fn test_malformed_base64_rejected() {
        let key = test_key();
        let field = EncryptedField {
            encrypted_data: "@@not base64@@".into(),
            iv: "@@also bad@@".into(),
        };
        assert!(matches!(
            decrypt(&field, &key),
            Err(KeyfortError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_wrong_nonce_length_rejected() {
        let key = test_key();
        let field = EncryptedField {
            encrypted_data: crate::b64_encode(b"whatever"),
            iv: crate::b64_encode(&[0u8; 16]),
        };
        assert!(matches!(
            decrypt(&field, &key),
            Err(KeyfortError::InvalidInput(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_roundtrip_any_plaintext(plaintext in ".{0,200}") {
            let key = test_key();
            let field = encrypt(&plaintext, &key).unwrap();
            prop_assert_eq!(decrypt(&field, &key).unwrap(), plaintext);
        }

        #[test]
        fn prop_key_isolation(plaintext in ".{0,100}") {
            let field = encrypt(&plaintext, &test_key()).unwrap();
            prop_assert!(decrypt(&field, &test_key()).is_err());
        }
    }
}
