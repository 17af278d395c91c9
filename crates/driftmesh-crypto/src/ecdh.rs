//! X25519 key agreement.
//!
//! A device holds one long-lived [`StaticKey`]; senders create a
//! one-shot [`EphemeralKey`] per ciphertext. Secrets zeroize on drop
//! and intentionally implement neither `Clone` nor `Debug`.

use driftmesh_types::{DriftError, Result};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of an X25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Parses a 32-byte X25519 public key.
///
/// # Errors
///
/// [`DriftError::CryptoError`] on any other length.
pub fn public_key_from_slice(bytes: &[u8]) -> Result<PublicKey> {
    let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| DriftError::CryptoError {
        reason: format!(
            "x25519 public key must be {PUBLIC_KEY_LEN} bytes, got {}",
            bytes.len()
        ),
    })?;
    Ok(PublicKey::from(arr))
}

// ---------------------------------------------------------------------------
// SharedSecret
// ---------------------------------------------------------------------------

/// Raw Diffie-Hellman output. Feed it to HKDF, never use it directly
/// as a cipher key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// StaticKey
// ---------------------------------------------------------------------------

/// Long-lived device key.
pub struct StaticKey {
    secret: StaticSecret,
    public: PublicKey,
}

impl StaticKey {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restores a key from stored secret bytes.
    pub fn from_secret_bytes(mut bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn agree(&self, their_public: &PublicKey) -> SharedSecret {
        SharedSecret(*self.secret.diffie_hellman(their_public).as_bytes())
    }
}

// ---------------------------------------------------------------------------
// EphemeralKey
// ---------------------------------------------------------------------------

/// Single-use sender key. Consumed by [`agree`](Self::agree).
pub struct EphemeralKey {
    secret: StaticSecret,
    public: PublicKey,
}

impl EphemeralKey {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public half; must accompany the ciphertext.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn agree(self, their_public: &PublicKey) -> SharedSecret {
        SharedSecret(*self.secret.diffie_hellman(their_public).as_bytes())
    }
}
