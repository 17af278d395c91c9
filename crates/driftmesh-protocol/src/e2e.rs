//! End-to-end sealing of the envelope `payload` field.
//!
//! The payload JSON is encrypted for the final recipient's public key
//! and stored as standard base64 text. Relays carry the text as-is.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use driftmesh_crypto::{CryptoFacade, HYBRID_CONTEXT};
use driftmesh_types::{DriftError, Result};

/// Base64 text form of a public key, as carried in handshakes and
/// contact records.
pub fn encode_public_key(key: &[u8]) -> String {
    STANDARD.encode(key)
}

pub fn decode_public_key(text: &str) -> Result<Vec<u8>> {
    STANDARD.decode(text).map_err(|e| DriftError::CryptoError {
        reason: format!("public key is not valid base64: {e}"),
    })
}

/// Encrypts `plaintext` for `recipient_key` and returns base64 text.
pub fn seal_payload(
    crypto: &dyn CryptoFacade,
    plaintext: &str,
    recipient_key: &[u8],
) -> Result<String> {
    let ct = crypto.encrypt(plaintext.as_bytes(), recipient_key)?;
    Ok(STANDARD.encode(ct))
}

/// Reverses [`seal_payload`] with the local private key.
///
/// # Errors
///
/// [`DriftError::CryptoError`] if the text is not base64, was sealed
/// for someone else or is not UTF-8 once decrypted.
pub fn open_payload(crypto: &dyn CryptoFacade, payload: &str) -> Result<String> {
    let ct = STANDARD.decode(payload).map_err(|e| DriftError::CryptoError {
        reason: format!("sealed payload is not valid base64: {e}"),
    })?;
    let pt = crypto.decrypt(&ct, HYBRID_CONTEXT)?;
    String::from_utf8(pt).map_err(|e| DriftError::CryptoError {
        reason: format!("decrypted payload is not utf-8: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use driftmesh_crypto::HybridKeypair;

    use super::*;

    #[test]
    fn only_recipient_opens_payload() -> Result<()> {
        let sender = HybridKeypair::generate();
        let recipient = HybridKeypair::generate();
        let relay = HybridKeypair::generate();

        let sealed = seal_payload(&sender, r#"{"text":"hi"}"#, &recipient.my_public_key())?;
        assert!(!sealed.contains("hi"));
        assert_eq!(open_payload(&recipient, &sealed)?, r#"{"text":"hi"}"#);
        assert!(open_payload(&relay, &sealed).is_err());
        Ok(())
    }

    #[test]
    fn plaintext_payload_does_not_open() {
        let kp = HybridKeypair::generate();
        assert!(open_payload(&kp, r#"{"text":"hi"}"#).is_err());
    }

    #[test]
    fn public_key_text_form() -> Result<()> {
        let kp = HybridKeypair::generate();
        let text = encode_public_key(&kp.my_public_key());
        assert_eq!(decode_public_key(&text)?, kp.my_public_key());
        assert!(decode_public_key("not base64!").is_err());
        Ok(())
    }
}
