//! Cryptographic capability for the driftmesh routing engine.
//!
//! The routing engine never touches raw primitives. It talks to a
//! [`CryptoFacade`]: "encrypt for this public key" and "decrypt with
//! my private key". The same capability protects both the end-to-end
//! payload layer and the hop-by-hop link layer.
//!
//! # Modules
//!
//! - [`aead`]: XChaCha20-Poly1305 sealing with a random nonce
//! - [`ecdh`]: X25519 key agreement
//! - [`hkdf`]: HKDF-SHA256 key derivation
//! - [`hybrid`]: the [`CryptoFacade`] trait and its ECIES-style
//!   implementation [`HybridKeypair`]

pub mod aead;
pub mod ecdh;
pub mod hkdf;
pub mod hybrid;

pub use hybrid::{CryptoFacade, HybridKeypair, HYBRID_CONTEXT};
