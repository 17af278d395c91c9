//! The crypto capability consumed by the routing engine.
//!
//! [`HybridKeypair`] implements an ECIES-style scheme:
//!
//! 1. Generate an ephemeral X25519 key.
//! 2. ECDH with the recipient's static public key.
//! 3. HKDF-SHA256 with `salt = eph_pub || recipient_pub` and
//!    `info = context` to get a 256-bit key.
//! 4. Seal with XChaCha20-Poly1305, `aad = eph_pub`.
//!
//! Ciphertext layout: `eph_pub(32) || nonce(24) || ciphertext+tag`.
//!
//! The same capability is used for the end-to-end payload layer and
//! the hop-by-hop link layer; both pass [`HYBRID_CONTEXT`].

use driftmesh_types::{DriftError, Result};

use crate::aead::{self, SealedBox};
use crate::ecdh::{self, EphemeralKey, StaticKey, PUBLIC_KEY_LEN};
use crate::hkdf::derive_key;

/// HKDF info label bound into every ciphertext.
pub const HYBRID_CONTEXT: &[u8] = b"driftmesh-hybrid-v1";

// ---------------------------------------------------------------------------
// CryptoFacade
// ---------------------------------------------------------------------------

/// "Encrypt for a public key" and "decrypt with my private key".
///
/// Failures are ordinary [`DriftError::CryptoError`] values; callers
/// drop the affected envelope and continue.
pub trait CryptoFacade: Send + Sync {
    /// Public key other devices use to encrypt for us.
    fn my_public_key(&self) -> Vec<u8>;

    /// Encrypts `plaintext` so only the holder of the private key
    /// matching `recipient_public_key` can read it.
    fn encrypt(&self, plaintext: &[u8], recipient_public_key: &[u8]) -> Result<Vec<u8>>;

    /// Decrypts a ciphertext addressed to us. `context` must match
    /// the label the sender bound into the ciphertext.
    fn decrypt(&self, ciphertext: &[u8], context: &[u8]) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// HybridKeypair
// ---------------------------------------------------------------------------

/// Device keypair implementing [`CryptoFacade`].
pub struct HybridKeypair {
    key: StaticKey,
}

impl HybridKeypair {
    pub fn generate() -> Self {
        Self {
            key: StaticKey::generate(),
        }
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            key: StaticKey::from_secret_bytes(bytes),
        }
    }

    fn seal_for(
        plaintext: &[u8],
        recipient_public_key: &[u8],
        context: &[u8],
    ) -> Result<Vec<u8>> {
        let recipient = ecdh::public_key_from_slice(recipient_public_key)?;
        let eph = EphemeralKey::generate();
        let eph_pub = eph.public_key();
        let shared = eph.agree(&recipient);

        let salt = [eph_pub.as_bytes().as_slice(), recipient.as_bytes().as_slice()].concat();
        let key = derive_key(shared.as_bytes(), &salt, context)?;
        let sealed = aead::seal(key.as_bytes(), plaintext, eph_pub.as_bytes())?;

        let mut out = Vec::with_capacity(PUBLIC_KEY_LEN + aead::NONCE_LEN + sealed.ciphertext.len());
        out.extend_from_slice(eph_pub.as_bytes());
        out.extend_from_slice(&sealed.to_bytes());
        Ok(out)
    }
}

impl std::fmt::Debug for HybridKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridKeypair")
            .field("public", &hex::encode(&self.key.public_key().as_bytes()[..4]))
            .finish_non_exhaustive()
    }
}

impl CryptoFacade for HybridKeypair {
    fn my_public_key(&self) -> Vec<u8> {
        self.key.public_key().as_bytes().to_vec()
    }

    fn encrypt(&self, plaintext: &[u8], recipient_public_key: &[u8]) -> Result<Vec<u8>> {
        Self::seal_for(plaintext, recipient_public_key, HYBRID_CONTEXT)
    }

    fn decrypt(&self, ciphertext: &[u8], context: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < PUBLIC_KEY_LEN {
            return Err(DriftError::CryptoError {
                reason: format!("ciphertext too short: {} bytes", ciphertext.len()),
            });
        }
        let (eph_bytes, rest) = ciphertext.split_at(PUBLIC_KEY_LEN);
        let eph_pub = ecdh::public_key_from_slice(eph_bytes)?;
        let shared = self.key.agree(&eph_pub);

        let salt = [eph_bytes, self.key.public_key().as_bytes().as_slice()].concat();
        let key = derive_key(shared.as_bytes(), &salt, context)?;
        let sealed = SealedBox::from_bytes(rest)?;
        aead::open(key.as_bytes(), &sealed, eph_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_shows_key_prefix_only() {
        let kp = HybridKeypair::generate();
        let public = kp.my_public_key();
        let shown = format!("{kp:?}");
        assert!(shown.contains(&hex::encode(&public[..4])));
        assert!(!shown.contains(&hex::encode(&public)));
    }

    #[test]
    fn recipient_can_decrypt() -> Result<()> {
        let sender = HybridKeypair::generate();
        let recipient = HybridKeypair::generate();

        let ct = sender.encrypt(b"meet at the ridge", &recipient.my_public_key())?;
        let pt = recipient.decrypt(&ct, HYBRID_CONTEXT)?;
        assert_eq!(pt, b"meet at the ridge");
        Ok(())
    }

    #[test]
    fn third_party_cannot_decrypt() -> Result<()> {
        let sender = HybridKeypair::generate();
        let recipient = HybridKeypair::generate();
        let relay = HybridKeypair::generate();

        let ct = sender.encrypt(b"private", &recipient.my_public_key())?;
        assert!(relay.decrypt(&ct, HYBRID_CONTEXT).is_err());
        Ok(())
    }

    #[test]
    fn context_mismatch_fails() -> Result<()> {
        let recipient = HybridKeypair::generate();
        let ct = recipient.encrypt(b"x", &recipient.my_public_key())?;
        assert!(recipient.decrypt(&ct, b"other-context").is_err());
        Ok(())
    }

    #[test]
    fn ciphertext_layout() -> Result<()> {
        let recipient = HybridKeypair::generate();
        let ct = recipient.encrypt(b"12345", &recipient.my_public_key())?;
        assert_eq!(ct.len(), PUBLIC_KEY_LEN + aead::NONCE_LEN + 5 + aead::TAG_LEN);
        Ok(())
    }

    #[test]
    fn malformed_recipient_key_rejected() {
        let sender = HybridKeypair::generate();
        assert!(sender.encrypt(b"x", &[1, 2, 3]).is_err());
    }

    #[test]
    fn truncated_ciphertext_rejected() {
        let kp = HybridKeypair::generate();
        assert!(kp.decrypt(&[0u8; 10], HYBRID_CONTEXT).is_err());
        assert!(kp.decrypt(&[0u8; 40], HYBRID_CONTEXT).is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = HybridKeypair::from_secret_bytes([0x5a; 32]);
        let shown = format!("{kp:?}");
        assert!(!shown.contains("5a5a5a5a5a"));
    }
}
