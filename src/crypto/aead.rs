//! AEAD encryption - AES-256-GCM and XChaCha20-Poly1305

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Key length shared by both ciphers
pub const KEY_LEN: usize = 32;

/// Poly1305 / GCM tag length
pub const TAG_LEN: usize = 16;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AeadError {
    #[error("RNG failed: {0}")]
    Rng(String),

    #[error("Encryption failed")]
    Encrypt,

    /// Bad tag, wrong key, wrong AAD and malformed nonce all land here.
    #[error("Decryption failed")]
    Decrypt,
}

/// AEAD cipher type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AeadCipher {
    /// AES-256-GCM (12-byte nonce)
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// XChaCha20-Poly1305 (24-byte nonce) - preferred
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
}

impl Default for AeadCipher {
    fn default() -> Self {
        Self::XChaCha20Poly1305
    }
}

impl AeadCipher {
    pub fn nonce_len(&self) -> usize {
        match self {
            Self::Aes256Gcm => 12,
            Self::XChaCha20Poly1305 => 24,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::XChaCha20Poly1305 => "XChaCha20-Poly1305",
        }
    }

    /// Identifier stored in blob metadata
    pub fn id(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes-256-gcm",
            Self::XChaCha20Poly1305 => "xchacha20-poly1305",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "aes-256-gcm" => Some(Self::Aes256Gcm),
            "xchacha20-poly1305" => Some(Self::XChaCha20Poly1305),
            _ => None,
        }
    }
}

/// Ciphertext together with the nonce it was sealed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: Vec<u8>,
    /// Ciphertext with authentication tag
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    /// Serialize to bytes (nonce || ciphertext)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.nonce.len() + self.ciphertext.len());
        result.extend_from_slice(&self.nonce);
        result.extend_from_slice(&self.ciphertext);
        result
    }

    /// Split `nonce || ciphertext` for the given cipher
    pub fn from_bytes(data: &[u8], cipher: AeadCipher) -> Result<Self, AeadError> {
        let nonce_len = cipher.nonce_len();
        if data.len() < nonce_len + TAG_LEN {
            return Err(AeadError::Decrypt);
        }

        Ok(Self {
            nonce: data[..nonce_len].to_vec(),
            ciphertext: data[nonce_len..].to_vec(),
        })
    }
}

/// Fill a buffer from the OS CSPRNG
pub fn random_bytes<const N: usize>() -> Result<[u8; N], AeadError> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).map_err(|e| AeadError::Rng(e.to_string()))?;
    Ok(bytes)
}

/// Encrypt with a fresh random nonce
pub fn encrypt(
    cipher: AeadCipher,
    key: &[u8; KEY_LEN],
    aad: Option<&[u8]>,
    plaintext: &[u8],
) -> Result<Sealed, AeadError> {
    let payload = Payload {
        msg: plaintext,
        aad: aad.unwrap_or_default(),
    };

    match cipher {
        AeadCipher::Aes256Gcm => {
            let c = Aes256Gcm::new_from_slice(key).map_err(|_| AeadError::Encrypt)?;
            let nonce_bytes = random_bytes::<12>()?;
            let ciphertext = c
                .encrypt(AesNonce::from_slice(&nonce_bytes), payload)
                .map_err(|_| AeadError::Encrypt)?;
            Ok(Sealed {
                nonce: nonce_bytes.to_vec(),
                ciphertext,
            })
        }
        AeadCipher::XChaCha20Poly1305 => {
            let c = XChaCha20Poly1305::new_from_slice(key).map_err(|_| AeadError::Encrypt)?;
            let nonce_bytes = random_bytes::<24>()?;
            let ciphertext = c
                .encrypt(XNonce::from_slice(&nonce_bytes), payload)
                .map_err(|_| AeadError::Encrypt)?;
            Ok(Sealed {
                nonce: nonce_bytes.to_vec(),
                ciphertext,
            })
        }
    }
}

/// Decrypt and authenticate. Never returns partial plaintext.
pub fn decrypt(
    cipher: AeadCipher,
    key: &[u8; KEY_LEN],
    nonce: &[u8],
    aad: Option<&[u8]>,
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, AeadError> {
    if nonce.len() != cipher.nonce_len() {
        return Err(AeadError::Decrypt);
    }

    let payload = Payload {
        msg: ciphertext,
        aad: aad.unwrap_or_default(),
    };

    let plaintext = match cipher {
        AeadCipher::Aes256Gcm => Aes256Gcm::new_from_slice(key)
            .map_err(|_| AeadError::Decrypt)?
            .decrypt(AesNonce::from_slice(nonce), payload),
        AeadCipher::XChaCha20Poly1305 => XChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| AeadError::Decrypt)?
            .decrypt(XNonce::from_slice(nonce), payload),
    };

    plaintext.map(Zeroizing::new).map_err(|_| AeadError::Decrypt)
}

/// Decrypt a `Sealed` value
pub fn open(
    cipher: AeadCipher,
    key: &[u8; KEY_LEN],
    aad: Option<&[u8]>,
    sealed: &Sealed,
) -> Result<Zeroizing<Vec<u8>>, AeadError> {
    decrypt(cipher, key, &sealed.nonce, aad, &sealed.ciphertext)
}
