//! Password-based payload encryption.
//!
//! ## Security Model
//!
//! - PBKDF2-HMAC-SHA256, 100 000 iterations, derives a 256-bit key
//! - AES-256-GCM for authenticated encryption
//! - Fresh random salt and nonce on every call
//! - Derived keys are zeroized on drop and cannot be read back out
//! - Every decryption failure maps to one opaque error
//!
//! ## Usage
//!
//! ```ignore
//! use memosync_core::crypto::{encrypt, decrypt};
//!
//! let payload = encrypt("{\"memos\":[]}", "correct horse")?;
//! let plaintext = decrypt(&payload, "correct horse")?;
//! ```

mod encrypted;

pub use encrypted::{
    compute_checksum, decrypt, derive_key, encrypt, CryptoManager, EncryptedPayload,
    EncryptionKey, KEY_SIZE, NONCE_SIZE, PBKDF2_ITERATIONS, SALT_SIZE,
};
