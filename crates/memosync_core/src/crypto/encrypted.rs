//! PBKDF2 + AES-256-GCM implementation.

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the PBKDF2 salt in bytes.
pub const SALT_SIZE: usize = 16;
/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// A password-derived AES-256-GCM key.
///
/// There is no accessor for the raw bytes; the key can only be handed to a
/// [`CryptoManager`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derives a key from a UTF-8 password and salt with PBKDF2-HMAC-SHA256.
#[must_use]
pub fn derive_key(password: &str, salt: &[u8]) -> EncryptionKey {
    let mut bytes = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut bytes);
    EncryptionKey { bytes }
}

/// Self-contained encrypted payload: everything except the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Base64 ciphertext with the GCM tag appended.
    pub ciphertext: String,
    /// Base64 PBKDF2 salt (16 bytes).
    pub salt: String,
    /// Base64 GCM nonce (12 bytes).
    pub iv: String,
}

/// AES-256-GCM cipher bound to one key.
pub struct CryptoManager {
    cipher: Aes256Gcm,
}

impl CryptoManager {
    /// Creates a crypto manager for `key`.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&key.bytes));
        Self { cipher }
    }

    /// Encrypts `plaintext` under `nonce`.
    pub fn encrypt(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        self.cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| CoreError::encryption_failed("AES-GCM encryption error"))
    }

    /// Decrypts and authenticates `ciphertext` under `nonce`.
    pub fn decrypt(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> CoreResult<Vec<u8>> {
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::decryption_failed())
    }
}

impl std::fmt::Debug for CryptoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoManager")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}

/// Encrypts `plaintext` with a key derived from `password`.
///
/// Salt and nonce are freshly random on every call.
pub fn encrypt(plaintext: &str, password: &str) -> CoreResult<EncryptedPayload> {
    let mut salt = [0u8; SALT_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let key = derive_key(password, &salt);
    let ciphertext = CryptoManager::new(&key).encrypt(&nonce, plaintext.as_bytes())?;

    Ok(EncryptedPayload {
        ciphertext: BASE64.encode(ciphertext),
        salt: BASE64.encode(salt),
        iv: BASE64.encode(nonce),
    })
}

/// Decrypts a payload produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CoreError::DecryptionFailed`] for any failure: malformed
/// encoding, wrong lengths, wrong password, or a tampered ciphertext.
pub fn decrypt(payload: &EncryptedPayload, password: &str) -> CoreResult<String> {
    let opaque = |_| CoreError::decryption_failed();

    let salt = BASE64.decode(&payload.salt).map_err(opaque)?;
    let nonce: [u8; NONCE_SIZE] = BASE64
        .decode(&payload.iv)
        .map_err(opaque)?
        .try_into()
        .map_err(|_| CoreError::decryption_failed())?;
    let ciphertext = BASE64.decode(&payload.ciphertext).map_err(opaque)?;

    if salt.len() != SALT_SIZE {
        return Err(CoreError::decryption_failed());
    }

    let key = derive_key(password, &salt);
    let plaintext = CryptoManager::new(&key).decrypt(&nonce, &ciphertext)?;
    String::from_utf8(plaintext).map_err(|_| CoreError::decryption_failed())
}

/// Lowercase hex SHA-256 of `data`. For display, not for trust decisions.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let payload = encrypt("Hello, memosync!", "pw").unwrap();
        assert_eq!(decrypt(&payload, "pw").unwrap(), "Hello, memosync!");
    }

    #[test]
    fn empty_and_nul_plaintexts() {
        for plaintext in ["", "a\0b\0", "\0"] {
            let payload = encrypt(plaintext, "pw").unwrap();
            assert_eq!(decrypt(&payload, "pw").unwrap(), plaintext);
        }
    }

    #[test]
    fn fresh_salt_and_nonce_per_call() {
        let a = encrypt("same", "pw").unwrap();
        let b = encrypt("same", "pw").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_eq!(BASE64.decode(&a.salt).unwrap().len(), SALT_SIZE);
        assert_eq!(BASE64.decode(&a.iv).unwrap().len(), NONCE_SIZE);
    }

    #[test]
    fn wrong_password_fails() {
        let payload = encrypt("secret", "pw1").unwrap();
        assert!(matches!(decrypt(&payload, "pw2"), Err(CoreError::DecryptionFailed)));
    }

    #[test]
    fn every_bit_flip_is_detected() {
        let payload = encrypt("tamper me", "pw").unwrap();
        let raw = BASE64.decode(&payload.ciphertext).unwrap();

        for byte in 0..raw.len() {
            let mut flipped = raw.clone();
            flipped[byte] ^= 1 << (byte % 8);
            let tampered = EncryptedPayload {
                ciphertext: BASE64.encode(&flipped),
                ..payload.clone()
            };
            assert!(matches!(decrypt(&tampered, "pw"), Err(CoreError::DecryptionFailed)));
        }
    }

    #[test]
    fn malformed_payloads_fail_opaquely() {
        let good = encrypt("x", "pw").unwrap();

        let bad_b64 = EncryptedPayload {
            ciphertext: "not base64!!".into(),
            ..good.clone()
        };
        let short_iv = EncryptedPayload {
            iv: BASE64.encode([0u8; 8]),
            ..good.clone()
        };
        let short_salt = EncryptedPayload {
            salt: BASE64.encode([0u8; 4]),
            ..good
        };

        for payload in [bad_b64, short_iv, short_salt] {
            assert!(matches!(decrypt(&payload, "pw"), Err(CoreError::DecryptionFailed)));
        }
    }

    #[test]
    fn derive_key_is_deterministic() {
        let manager_a = CryptoManager::new(&derive_key("pw", b"0123456789abcdef"));
        let manager_b = CryptoManager::new(&derive_key("pw", b"0123456789abcdef"));
        let manager_c = CryptoManager::new(&derive_key("pw", b"fedcba9876543210"));

        let nonce = [7u8; NONCE_SIZE];
        let ct = manager_a.encrypt(&nonce, b"data").unwrap();
        assert_eq!(manager_b.decrypt(&nonce, &ct).unwrap(), b"data");
        assert!(manager_c.decrypt(&nonce, &ct).is_err());
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = derive_key("pw", b"salt");
        assert!(format!("{key:?}").contains("REDACTED"));
    }

    #[test]
    fn checksum_is_sha256_hex() {
        assert_eq!(
            compute_checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(compute_checksum(b"abc").len(), 64);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn roundtrip_arbitrary_utf8(plaintext in ".*", password in "\\PC{0,16}") {
            let payload = encrypt(&plaintext, &password).unwrap();
            prop_assert_eq!(decrypt(&payload, &password).unwrap(), plaintext);
        }
    }
}
