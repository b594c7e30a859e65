//! At-rest encryption of record lines.
//!
//! Each record line is sealed with AES-256-GCM under a 128-bit random IV and
//! stored as a hex envelope `{ encrypted, iv, authTag }`. The 256-bit key is
//! derived once per store from the operator secret with Argon2id.
//!
//! The KDF salt is a fixed constant. Changing it would make every record
//! written so far undecryptable, so the salt is part of the on-disk format.

use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, AeadInPlace, KeyInit},
    aes::Aes256,
    AesGcm,
};
use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use trustverify_contracts::error::{WormError, WormResult};

/// AES-256-GCM with a 16-byte nonce.
type Aes256Gcm128 = AesGcm<Aes256, U16>;

const KDF_SALT: &[u8] = b"trustverify-worm-storage-v1";
const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

/// The on-disk form of an encrypted record line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub encrypted: String,
    pub iv: String,
    pub auth_tag: String,
}

/// Seals and opens record envelopes under one derived key.
pub struct RecordCipher {
    cipher: Aes256Gcm128,
}

impl RecordCipher {
    /// Derive the record key from `secret`.
    pub fn from_secret(secret: &str) -> WormResult<Self> {
        if secret.is_empty() {
            return Err(WormError::ConfigError {
                reason: "encryption key must not be empty".to_string(),
            });
        }

        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(secret.as_bytes(), KDF_SALT, &mut key)
            .map_err(|e| WormError::Encryption {
                reason: format!("key derivation failed: {}", e),
            })?;

        let cipher = Aes256Gcm128::new_from_slice(&key).map_err(|e| WormError::Encryption {
            reason: format!("invalid derived key: {}", e),
        });
        key.fill(0);

        Ok(Self { cipher: cipher? })
    }

    /// Encrypt `plaintext` under a fresh random IV.
    pub fn seal(&self, plaintext: &[u8]) -> WormResult<Envelope> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| WormError::Encryption {
                reason: "AES-GCM encryption failed".to_string(),
            })?;

        Ok(Envelope {
            encrypted: hex::encode(&buffer),
            iv: hex::encode(iv),
            auth_tag: hex::encode(tag),
        })
    }

    /// Decrypt and authenticate `envelope`.
    ///
    /// Fails on malformed hex, wrong IV/tag length, a different key, or any
    /// modification of the ciphertext.
    pub fn open(&self, envelope: &Envelope) -> WormResult<Vec<u8>> {
        let iv = decode_exact(&envelope.iv, IV_LEN, "iv")?;
        let tag = decode_exact(&envelope.auth_tag, TAG_LEN, "authTag")?;
        let mut buffer = hex::decode(&envelope.encrypted).map_err(|e| WormError::Decryption {
            reason: format!("ciphertext is not valid hex: {}", e),
        })?;

        self.cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(&tag),
            )
            .map_err(|_| WormError::Decryption {
                reason: "authentication failed (wrong key or tampered record)".to_string(),
            })?;

        Ok(buffer)
    }
}

fn decode_exact(field: &str, len: usize, name: &str) -> WormResult<Vec<u8>> {
    let bytes = hex::decode(field).map_err(|e| WormError::Decryption {
        reason: format!("{} is not valid hex: {}", name, e),
    })?;
    if bytes.len() != len {
        return Err(WormError::Decryption {
            reason: format!("{} must be {} bytes, got {}", name, len, bytes.len()),
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_returns_plaintext() {
        let cipher = RecordCipher::from_secret("operator-secret").unwrap();
        let envelope = cipher.seal(br#"{"eventType":"escrow.released"}"#).unwrap();

        assert_eq!(envelope.iv.len(), IV_LEN * 2);
        assert_eq!(envelope.auth_tag.len(), TAG_LEN * 2);
        assert!(!envelope.encrypted.contains("escrow"));

        let plaintext = cipher.open(&envelope).unwrap();
        assert_eq!(plaintext, br#"{"eventType":"escrow.released"}"#);
    }

    #[test]
    fn every_seal_uses_a_fresh_iv() {
        let cipher = RecordCipher::from_secret("operator-secret").unwrap();
        let a = cipher.seal(b"same").unwrap();
        let b = cipher.seal(b"same").unwrap();

        assert_ne!(a.iv, b.iv);
        assert_ne!(a.encrypted, b.encrypted);
    }

    #[test]
    fn same_secret_derives_same_key() {
        let writer = RecordCipher::from_secret("shared").unwrap();
        let reader = RecordCipher::from_secret("shared").unwrap();

        let envelope = writer.seal(b"payload").unwrap();
        assert_eq!(reader.open(&envelope).unwrap(), b"payload");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let writer = RecordCipher::from_secret("right").unwrap();
        let reader = RecordCipher::from_secret("wrong").unwrap();

        let envelope = writer.seal(b"payload").unwrap();
        assert!(matches!(reader.open(&envelope), Err(WormError::Decryption { .. })));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let cipher = RecordCipher::from_secret("k").unwrap();
        let mut envelope = cipher.seal(b"amount=100").unwrap();

        let mut bytes = hex::decode(&envelope.encrypted).unwrap();
        bytes[0] ^= 0x01;
        envelope.encrypted = hex::encode(bytes);

        assert!(cipher.open(&envelope).is_err());
    }

    #[test]
    fn malformed_envelope_is_rejected() {
        let cipher = RecordCipher::from_secret("k").unwrap();
        let mut envelope = cipher.seal(b"x").unwrap();
        envelope.iv = "abcd".to_string();

        let err = cipher.open(&envelope).unwrap_err();
        assert!(err.to_string().contains("iv must be 16 bytes"), "got: {err}");
    }

    #[test]
    fn envelope_field_names() {
        let cipher = RecordCipher::from_secret("k").unwrap();
        let json = serde_json::to_value(cipher.seal(b"x").unwrap()).unwrap();

        assert!(json.get("encrypted").is_some());
        assert!(json.get("iv").is_some());
        assert!(json.get("authTag").is_some());
    }

    #[test]
    fn empty_secret_is_a_config_error() {
        assert!(matches!(
            RecordCipher::from_secret(""),
            Err(WormError::ConfigError { .. })
        ));
    }
}
