//! HKDF derivation of purpose keys and key fingerprints

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Derive a 32-byte purpose key from the master key
pub fn derive_subkey(master: &[u8; 32], purpose: &str) -> Zeroizing<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, master);
    let mut okm = Zeroizing::new([0u8; 32]);
    let expanded = hk.expand(purpose.as_bytes(), okm.as_mut_slice());
    debug_assert!(expanded.is_ok(), "32 bytes is within the HKDF-SHA256 output limit");
    okm
}

/// Public identifier of a key: 8 HKDF bytes, hex encoded
pub fn key_fingerprint(master: &[u8; 32]) -> String {
    let hk = Hkdf::<Sha256>::new(None, master);
    let mut id = [0u8; 8];
    let expanded = hk.expand(purposes::KEY_ID.as_bytes(), &mut id);
    debug_assert!(expanded.is_ok(), "8 bytes is within the HKDF-SHA256 output limit");
    hex::encode(id)
}

/// Predefined derivation purposes
pub mod purposes {
    pub const KEY_ID: &str = "ALFA:securestore:key-id";
    pub const STORAGE: &str = "ALFA:securestore:storage";
    pub const STATE: &str = "ALFA:securestore:state";
    pub const BACKUP: &str = "ALFA:securestore:backup";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_deterministic() {
        let master = [42u8; 32];
        let k1 = derive_subkey(&master, purposes::STORAGE);
        let k2 = derive_subkey(&master, purposes::STORAGE);
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn test_different_purposes_different_keys() {
        let master = [42u8; 32];
        let k1 = derive_subkey(&master, purposes::STORAGE);
        let k2 = derive_subkey(&master, purposes::STATE);
        assert_ne!(*k1, *k2);
    }

    #[test]
    fn test_fingerprint_shape() {
        let id = key_fingerprint(&[1u8; 32]);
        assert_eq!(id.len(), 16);
        assert_ne!(id, key_fingerprint(&[2u8; 32]));
    }
}
