//! HKDF-SHA256 (RFC 5869) for turning ECDH output into cipher keys.

use driftmesh_types::{DriftError, Result};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 256-bit symmetric key derived by [`derive_key`]. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; 32]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Derives a 32-byte key from `ikm`.
///
/// An empty `salt` means "no salt" (RFC 5869 §2.2 zero-filled salt).
/// `info` provides domain separation; callers pass a context label.
pub fn derive_key(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<DerivedKey> {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt, ikm);

    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm).map_err(|e| DriftError::CryptoError {
        reason: format!("hkdf expand failed: {e}"),
    })?;
    Ok(DerivedKey(okm))
}
