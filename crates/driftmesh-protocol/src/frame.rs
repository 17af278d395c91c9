//! Hop-by-hop link framing.
//!
//! On the link, an envelope travels either sealed for the immediate
//! neighbor inside a [`SealedFrame`] or, only for the bootstrap
//! discovery handshake to a neighbor whose key is unknown, as bare
//! envelope JSON.
//!
//! # Steps (inbound)
//!
//! 1. Parse the bytes as a [`SealedFrame`] and decrypt with the local key.
//! 2. If either step fails, parse the bytes as a bare envelope.
//! 3. If that fails too, the frame is rejected.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use driftmesh_crypto::{CryptoFacade, HYBRID_CONTEXT};
use driftmesh_types::{DriftError, Result};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Link wrapper around an encrypted envelope.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealedFrame {
    /// Base64 of the hybrid ciphertext of the envelope JSON.
    pub ciphertext: String,
}

/// How an inbound frame was carried.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameKind {
    Sealed,
    Plain,
}

/// Encrypts the whole envelope for the neighbor holding `neighbor_key`.
pub fn seal_for_link(
    crypto: &dyn CryptoFacade,
    envelope: &Envelope,
    neighbor_key: &[u8],
) -> Result<Vec<u8>> {
    let json = envelope.to_json()?;
    let ct = crypto.encrypt(json.as_bytes(), neighbor_key)?;
    let frame = SealedFrame {
        ciphertext: STANDARD.encode(ct),
    };
    Ok(serde_json::to_vec(&frame)?)
}

/// Bare envelope JSON, used only for the bootstrap handshake.
pub fn plain_frame(envelope: &Envelope) -> Result<Vec<u8>> {
    Ok(envelope.to_json()?.into_bytes())
}

fn open_sealed(crypto: &dyn CryptoFacade, bytes: &[u8]) -> Result<Envelope> {
    let frame: SealedFrame = serde_json::from_slice(bytes)?;
    let ct = STANDARD
        .decode(&frame.ciphertext)
        .map_err(|e| DriftError::CryptoError {
            reason: format!("frame ciphertext is not valid base64: {e}"),
        })?;
    let json = crypto.decrypt(&ct, HYBRID_CONTEXT)?;
    Envelope::from_json(&json)
}

/// Recovers the envelope from inbound link bytes.
///
/// # Errors
///
/// [`DriftError::InvalidEnvelope`] when the bytes are neither a
/// sealed frame we can open nor a bare envelope.
pub fn open_link_frame(crypto: &dyn CryptoFacade, bytes: &[u8]) -> Result<(Envelope, FrameKind)> {
    match open_sealed(crypto, bytes) {
        Ok(env) => Ok((env, FrameKind::Sealed)),
        Err(sealed_err) => match Envelope::from_json(bytes) {
            Ok(env) => Ok((env, FrameKind::Plain)),
            Err(plain_err) => Err(DriftError::InvalidEnvelope {
                reason: format!("unreadable frame: sealed: {sealed_err}; plain: {plain_err}"),
            }),
        },
    }
}
