//! Crypto module - Argon2id, AES-GCM, XChaCha20-Poly1305, HKDF

pub mod aead;
pub mod hkdf_derive;
pub mod kdf;

pub use aead::{AeadCipher, AeadError, Sealed, KEY_LEN};
pub use hkdf_derive::{derive_subkey, key_fingerprint, purposes};
pub use kdf::{derive_key, derive_key_async, generate_salt, KdfError, KdfProfile};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Standard base64 used by every persisted record
pub fn b64_encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn b64_decode(text: &str) -> Option<Vec<u8>> {
    STANDARD.decode(text).ok()
}
