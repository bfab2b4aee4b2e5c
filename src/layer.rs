//! Layer codec: one hybrid-encryption layer.
//!
//! seal: fresh AES key + IV -> AES-256-GCM(payload, aad = header)
//!       -> RSA-OAEP wrap of the AES key -> frame
//! open: parse frame -> unwrap AES key -> verify + decrypt payload
//!
//! Stateless; knows nothing about other layers.

use crate::aead;
use crate::error::{Error, Result};
use crate::wire::{self, SYMMETRIC_KEY_BYTES};
use crate::wrap::{KeyWrapProvider, PublicKey, SecretKey};

/// Encrypts `plaintext` into one layer frame addressed to `pk`.
pub fn seal_layer<W: KeyWrapProvider + ?Sized>(
    wrapper: &W,
    pk: &PublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let key = aead::key()?;
    let iv = aead::iv()?;

    let wrapped_key = wrapper.wrap_key(pk, key.as_slice())?;
    let header = wire::encode_header(&wrapped_key)?;
    let (ciphertext, tag) = aead::seal(&key, &iv, plaintext, &header)?;

    Ok(wire::encode_frame(header, &iv, &tag, &ciphertext))
}

/// Removes one layer with `sk`, returning the bytes it wrapped.
pub fn open_layer<W: KeyWrapProvider + ?Sized>(
    wrapper: &W,
    sk: &SecretKey,
    frame: &[u8],
) -> Result<Vec<u8>> {
    let parts = wire::decode_frame(frame)?;

    let key = wrapper.unwrap_key(sk, parts.wrapped_key)?;
    if key.len() != SYMMETRIC_KEY_BYTES {
        return Err(Error::Decryption);
    }

    aead::open(&key, parts.iv, parts.tag, parts.ciphertext, parts.header)
}
