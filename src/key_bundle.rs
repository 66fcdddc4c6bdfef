//! Key bundles - encryption + HMAC key pairs and their on-disk shapes
//!
//! Three shapes have been written over time and all of them stay readable:
//!
//! ```text
//! wrapped  { "encWrapped": WrappedKeyRecord, "hmacWrapped": WrappedKeyRecord }
//! raw      { "enc": base64, "hmac": base64 }          (degraded fallback)
//! opaque   { "key": base64 }                          (single key)
//! ```
//!
//! A stored value is classified exactly once, in that precedence order, and
//! only the fields of the winning shape are read.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::{aead, b64_decode, b64_encode, AeadCipher, AeadError, Sealed, KEY_LEN};
use crate::master_key::{KeyError, MasterKeyManager, WrappedKeyRecord};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("Unrecognized key format: {0}")]
    UnrecognizedKeyFormat(String),

    #[error("decryption key not available")]
    KeyUnavailable,

    #[error("key bundle could not be unwrapped")]
    Unwrap,

    #[error("bundle has no HMAC key")]
    MissingHmacKey,

    #[error(transparent)]
    Aead(#[from] AeadError),
}

impl From<KeyError> for BundleError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::KeyUnavailable => BundleError::KeyUnavailable,
            _ => BundleError::Unwrap,
        }
    }
}

/// Shape of a bundle as found in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredKeyBundle {
    Wrapped {
        enc: Option<WrappedKeyRecord>,
        hmac: Option<WrappedKeyRecord>,
    },
    Raw {
        enc: Option<String>,
        hmac: Option<String>,
    },
    Opaque {
        key: String,
    },
}

impl StoredKeyBundle {
    /// Classify a stored value: wrapped, then raw, then opaque
    pub fn resolve(raw: &Value) -> Result<Self, BundleError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| BundleError::UnrecognizedKeyFormat("not an object".into()))?;

        if obj.contains_key("encWrapped") || obj.contains_key("hmacWrapped") {
            return Ok(Self::Wrapped {
                enc: field(obj, "encWrapped")?,
                hmac: field(obj, "hmacWrapped")?,
            });
        }

        if obj.contains_key("enc") || obj.contains_key("hmac") {
            return Ok(Self::Raw {
                enc: field(obj, "enc")?,
                hmac: field(obj, "hmac")?,
            });
        }

        if let Some(key) = field::<String>(obj, "key")? {
            return Ok(Self::Opaque { key });
        }

        Err(BundleError::UnrecognizedKeyFormat(
            "no encWrapped, hmacWrapped, enc, hmac or key field".into(),
        ))
    }

    /// Parse a JSON string, then classify it
    pub fn resolve_str(raw: &str) -> Result<Self, BundleError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| BundleError::UnrecognizedKeyFormat(e.to_string()))?;
        Self::resolve(&value)
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Self::Wrapped { .. } => "wrapped-bundle",
            Self::Raw { .. } => "raw-bundle",
            Self::Opaque { .. } => "opaque",
        }
    }

    /// Turn the stored shape back into usable key material
    pub fn open(&self, manager: &MasterKeyManager) -> Result<KeyBundle, BundleError> {
        match self {
            Self::Wrapped { enc, hmac } => {
                let enc = enc.as_ref().ok_or_else(|| {
                    BundleError::UnrecognizedKeyFormat("wrapped bundle without encWrapped".into())
                })?;
                let enc_key = manager.unwrap_key(enc)?;
                let hmac_key = match hmac {
                    Some(record) => Some(manager.unwrap_key(record)?),
                    None => None,
                };
                KeyBundle::from_parts(&enc_key, hmac_key)
            }
            Self::Raw { enc, hmac } => {
                tracing::warn!("reading degraded raw key bundle (plaintext keys at rest)");
                let enc = enc.as_deref().ok_or_else(|| {
                    BundleError::UnrecognizedKeyFormat("raw bundle without enc".into())
                })?;
                let enc_key = decode_key(enc, "enc")?;
                let hmac_key = match hmac {
                    Some(h) => Some(decode_key(h, "hmac")?),
                    None => None,
                };
                KeyBundle::from_parts(&enc_key, hmac_key)
            }
            Self::Opaque { key } => {
                let enc_key = decode_key(key, "key")?;
                KeyBundle::from_parts(&enc_key, None)
            }
        }
    }
}

/// Resolve and open in one step
pub fn resolve_key_bundle(raw: &Value, manager: &MasterKeyManager) -> Result<KeyBundle, BundleError> {
    let stored = StoredKeyBundle::resolve(raw)?;
    tracing::debug!(shape = stored.shape(), "resolved key bundle");
    stored.open(manager)
}

fn field<T: DeserializeOwned>(obj: &Map<String, Value>, name: &str) -> Result<Option<T>, BundleError> {
    match obj.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| BundleError::UnrecognizedKeyFormat(format!("{}: {}", name, e))),
    }
}

fn decode_key(text: &str, name: &str) -> Result<Zeroizing<Vec<u8>>, BundleError> {
    b64_decode(text)
        .map(Zeroizing::new)
        .ok_or_else(|| BundleError::UnrecognizedKeyFormat(format!("{} is not base64", name)))
}

/// Usable key pair
pub struct KeyBundle {
    enc_key: Zeroizing<[u8; KEY_LEN]>,
    hmac_key: Option<Zeroizing<Vec<u8>>>,
}

impl fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBundle")
            .field("has_hmac_key", &self.hmac_key.is_some())
            .finish_non_exhaustive()
    }
}

impl KeyBundle {
    pub fn generate() -> Result<Self, BundleError> {
        Ok(Self {
            enc_key: Zeroizing::new(aead::random_bytes::<KEY_LEN>()?),
            hmac_key: Some(Zeroizing::new(aead::random_bytes::<KEY_LEN>()?.to_vec())),
        })
    }

    fn from_parts(enc: &[u8], hmac_key: Option<Zeroizing<Vec<u8>>>) -> Result<Self, BundleError> {
        let enc_key: [u8; KEY_LEN] = enc.try_into().map_err(|_| {
            BundleError::UnrecognizedKeyFormat(format!(
                "encryption key must be {} bytes, got {}",
                KEY_LEN,
                enc.len()
            ))
        })?;
        Ok(Self {
            enc_key: Zeroizing::new(enc_key),
            hmac_key,
        })
    }

    /// Persistable form; always the wrapped shape
    pub fn seal(&self, manager: &MasterKeyManager) -> Result<Value, BundleError> {
        let mut obj = Map::new();
        let enc = manager.wrap_key(self.enc_key.as_slice())?;
        obj.insert("encWrapped".into(), to_value(&enc)?);
        if let Some(hmac) = &self.hmac_key {
            let record = manager.wrap_key(hmac)?;
            obj.insert("hmacWrapped".into(), to_value(&record)?);
        }
        Ok(Value::Object(obj))
    }

    /// Degraded plaintext form, kept for hosts without a master key
    pub fn to_raw_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("enc".into(), Value::String(b64_encode(self.enc_key.as_slice())));
        if let Some(hmac) = &self.hmac_key {
            obj.insert("hmac".into(), Value::String(b64_encode(hmac)));
        }
        Value::Object(obj)
    }

    pub fn has_hmac_key(&self) -> bool {
        self.hmac_key.is_some()
    }

    pub fn encrypt(&self, cipher: AeadCipher, aad: Option<&[u8]>, plaintext: &[u8]) -> Result<Sealed, BundleError> {
        Ok(aead::encrypt(cipher, &self.enc_key, aad, plaintext)?)
    }

    pub fn decrypt(
        &self,
        cipher: AeadCipher,
        aad: Option<&[u8]>,
        sealed: &Sealed,
    ) -> Result<Zeroizing<Vec<u8>>, BundleError> {
        Ok(aead::open(cipher, &self.enc_key, aad, sealed)?)
    }

    /// HMAC-SHA256 tag over `data`
    pub fn sign(&self, data: &[u8]) -> Result<[u8; 32], BundleError> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }

    /// Constant-time tag check
    pub fn verify(&self, data: &[u8], tag: &[u8]) -> Result<bool, BundleError> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.verify_slice(tag).is_ok())
    }

    fn mac(&self) -> Result<HmacSha256, BundleError> {
        let key = self.hmac_key.as_ref().ok_or(BundleError::MissingHmacKey)?;
        // HMAC accepts keys of any length
        HmacSha256::new_from_slice(key).map_err(|_| BundleError::MissingHmacKey)
    }
}

fn to_value(record: &WrappedKeyRecord) -> Result<Value, BundleError> {
    serde_json::to_value(record).map_err(|e| BundleError::UnrecognizedKeyFormat(e.to_string()))
}
