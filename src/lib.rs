//! # Onion Envelope
//!
//! Sequential multi-authority hybrid encryption.
//!
//! A plaintext is wrapped through N layers, one per authority. Each layer is
//! AES-256-GCM under a fresh key, with that key RSA-OAEP(SHA-256) wrapped to
//! the authority's public key. Layers come off in strict reverse order.
//!
//! ## Quick Start
//!
//! ```rust
//! use onion_envelope::{AuthorityKeys, Onion};
//!
//! let onion = Onion::new();
//! let authorities = onion.generate_authorities(3).unwrap();
//!
//! let public: Vec<_> = authorities.iter().map(AuthorityKeys::public).collect();
//! let envelope = onion.seal(b"attack at dawn", &public, 3).unwrap();
//!
//! let secret: Vec<_> = authorities.iter().map(AuthorityKeys::secret).collect();
//! let plaintext = onion.open(&envelope, &secret, 3).unwrap();
//!
//! assert_eq!(plaintext, b"attack at dawn");
//! ```
//!
//! ## Properties
//!
//! - **Order-bound**: layer N must come off first; any other order fails
//! - **Fresh per layer**: new AES key and IV for every layer of every call
//! - **Authenticated**: each layer carries a GCM tag over its header and payload
//! - **Uniform decryption errors**: wrong key, wrong order and tampering look the same
//!
//! ## What's NOT Provided
//!
//! - Authority identity or authentication
//! - Key rotation
//! - Streaming encryption
//! - A layer count inside the envelope (N travels out of band)

#![deny(unsafe_code)]

mod aead;
mod error;
mod layer;
mod pipeline;
mod session;
mod store;
mod wrap;

// Wire module is public for the CLI inspect command and the fuzz targets
pub mod wire;

pub use error::{Error, FrameError, Result};
pub use layer::{open_layer, seal_layer};
pub use pipeline::{
    envelope_len, inspect, open_envelope, overhead, seal_envelope, validate_chain, Authority,
    AuthorityKeys, EnvelopeInfo, Onion,
};
pub use session::{run, Mode, Outcome, Session, SessionConfig, SessionError};
pub use store::{
    EnvelopeStore, FileStore, InMemoryStore, KeySource, KeyStore, LayerConfig, LayerCountStore,
    StoreError, CONFIG_FILE, DECRYPTED_FILE, ENVELOPE_FILE,
};
pub use wrap::{
    KeyWrapProvider, PublicKey, RsaOaepProvider, SecretKey, DEFAULT_MODULUS_BITS,
    MIN_MODULUS_BITS,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
