//! XChaCha20-Poly1305 sealing.
//!
//! Every call to [`seal`] draws a fresh 192-bit nonce from OS entropy,
//! so a key may be reused across messages. The nonce travels in front
//! of the ciphertext in [`SealedBox::to_bytes`].

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use driftmesh_types::{DriftError, Result};
use rand::rngs::OsRng;
use rand::RngCore;

/// XChaCha20 nonce length.
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length appended to every ciphertext.
pub const TAG_LEN: usize = 16;

// ---------------------------------------------------------------------------
// SealedBox
// ---------------------------------------------------------------------------

/// Nonce plus authenticated ciphertext.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SealedBox {
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the 16-byte tag appended.
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Serializes as `nonce || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parses the layout produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// [`DriftError::CryptoError`] if `bytes` cannot even hold a nonce
    /// and a tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(DriftError::CryptoError {
                reason: format!(
                    "sealed box too short: {} bytes, need at least {}",
                    bytes.len(),
                    NONCE_LEN + TAG_LEN
                ),
            });
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);
        Ok(Self {
            nonce,
            ciphertext: bytes[NONCE_LEN..].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

/// Encrypts `plaintext` under `key`, authenticating `aad` alongside.
pub fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<SealedBox> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|e| DriftError::CryptoError {
            reason: format!("aead seal failed: {e}"),
        })?;

    Ok(SealedBox { nonce, ciphertext })
}

/// Decrypts a [`SealedBox`] produced by [`seal`].
///
/// # Errors
///
/// [`DriftError::CryptoError`] if the tag does not verify: wrong key,
/// wrong `aad` or tampered bytes.
pub fn open(key: &[u8; 32], sealed: &SealedBox, aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            XNonce::from_slice(&sealed.nonce),
            Payload {
                msg: &sealed.ciphertext,
                aad,
            },
        )
        .map_err(|e| DriftError::CryptoError {
            reason: format!("aead open failed: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() -> Result<()> {
        let key = [7u8; 32];
        let sealed = seal(&key, b"carry me", b"hdr")?;
        assert_eq!(sealed.ciphertext.len(), b"carry me".len() + TAG_LEN);
        assert_eq!(open(&key, &sealed, b"hdr")?, b"carry me");
        Ok(())
    }

    #[test]
    fn fresh_nonce_per_seal() -> Result<()> {
        let key = [7u8; 32];
        let a = seal(&key, b"same", b"")?;
        let b = seal(&key, b"same", b"")?;
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
        Ok(())
    }

    #[test]
    fn wrong_aad_rejected() -> Result<()> {
        let key = [7u8; 32];
        let sealed = seal(&key, b"x", b"one")?;
        assert!(open(&key, &sealed, b"two").is_err());
        Ok(())
    }

    #[test]
    fn tampering_detected() -> Result<()> {
        let key = [7u8; 32];
        let mut sealed = seal(&key, b"payload", b"")?;
        if let Some(b) = sealed.ciphertext.last_mut() {
            *b ^= 0x01;
        }
        assert!(open(&key, &sealed, b"").is_err());
        Ok(())
    }

    #[test]
    fn byte_layout_parses_back() -> Result<()> {
        let key = [9u8; 32];
        let sealed = seal(&key, b"abc", b"")?;
        let parsed = SealedBox::from_bytes(&sealed.to_bytes())?;
        assert_eq!(parsed, sealed);
        Ok(())
    }

    #[test]
    fn short_input_rejected() {
        assert!(SealedBox::from_bytes(&[0u8; NONCE_LEN + TAG_LEN - 1]).is_err());
    }
}
