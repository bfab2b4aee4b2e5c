//! Envelope pipeline: fold the layer codec over an authority chain.
//!
//! ```text
//! seal:  plaintext -> L(1) -> L(2) -> ... -> L(N) = envelope
//! open:  envelope  -> L(N)^-1 -> ... -> L(1)^-1 = plaintext
//! ```
//!
//! Each layer's ciphertext is the whole previous frame, so layers can only
//! come off outermost first. The chain is validated up front to be exactly
//! `1..=N`; sealing folds over it forwards and opening folds backwards.

use rayon::prelude::*;
use tracing::debug;

use crate::error::{Error, Result};
use crate::layer::{open_layer, seal_layer};
use crate::wire::FIXED_OVERHEAD_BYTES;
use crate::wrap::{KeyWrapProvider, PublicKey, RsaOaepProvider, SecretKey};

/// One link of the chain: an authority's 1-based position and its key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authority<K> {
    pub index: u32,
    pub key: K,
}

impl<K> Authority<K> {
    pub fn new(index: u32, key: K) -> Self {
        Self { index, key }
    }
}

/// Both halves of an authority's keypair.
#[derive(Clone, Debug)]
pub struct AuthorityKeys {
    pub index: u32,
    pub public: PublicKey,
    pub secret: SecretKey,
}

impl AuthorityKeys {
    pub fn public(&self) -> Authority<&PublicKey> {
        Authority::new(self.index, &self.public)
    }

    pub fn secret(&self) -> Authority<&SecretKey> {
        Authority::new(self.index, &self.secret)
    }
}

/// Checks that `chain` is exactly authorities `1..=n`, in order.
pub fn validate_chain<K>(chain: &[Authority<K>], n: usize) -> Result<()> {
    if n == 0 {
        return Err(Error::NoAuthorities);
    }
    if chain.len() != n {
        return Err(Error::LayerCountMismatch {
            expected: n,
            actual: chain.len(),
        });
    }
    for (position, authority) in chain.iter().enumerate() {
        if authority.index as usize != position + 1 {
            return Err(Error::AuthorityOrder {
                position,
                index: authority.index,
            });
        }
    }
    Ok(())
}

/// Applies authorities `1..=n` in ascending order.
pub fn seal_envelope<W, K>(
    wrapper: &W,
    plaintext: &[u8],
    chain: &[Authority<K>],
    n: usize,
) -> Result<Vec<u8>>
where
    W: KeyWrapProvider + ?Sized,
    K: core::borrow::Borrow<PublicKey>,
{
    validate_chain(chain, n)?;

    chain.iter().try_fold(plaintext.to_vec(), |inner, authority| {
        let frame = seal_layer(wrapper, authority.key.borrow(), &inner)?;
        debug!(
            authority = authority.index,
            inner = inner.len(),
            outer = frame.len(),
            "sealed layer"
        );
        Ok(frame)
    })
}

/// Removes authorities `n..=1` in descending order.
pub fn open_envelope<W, K>(
    wrapper: &W,
    envelope: &[u8],
    chain: &[Authority<K>],
    n: usize,
) -> Result<Vec<u8>>
where
    W: KeyWrapProvider + ?Sized,
    K: core::borrow::Borrow<SecretKey>,
{
    validate_chain(chain, n)?;

    chain.iter().rev().try_fold(envelope.to_vec(), |outer, authority| {
        let inner = open_layer(wrapper, authority.key.borrow(), &outer).map_err(|e| {
            debug!(authority = authority.index, error = %e, "layer rejected");
            e
        })?;
        debug!(
            authority = authority.index,
            outer = outer.len(),
            inner = inner.len(),
            "opened layer"
        );
        Ok(inner)
    })
}

/// Bytes one layer adds when its wrapped key is `modulus_bytes` long.
pub const fn overhead(modulus_bytes: usize) -> usize {
    FIXED_OVERHEAD_BYTES + modulus_bytes
}

/// Envelope size for a payload of `payload_len` bytes sealed by `n`
/// authorities whose wrapped keys are `modulus_bytes` long.
pub const fn envelope_len(payload_len: usize, n: usize, modulus_bytes: usize) -> usize {
    payload_len + n * overhead(modulus_bytes)
}

/// Outer-layer metadata, readable without any key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopeInfo {
    pub total_len: usize,
    /// Wrapped-key length of the outermost layer (the RSA modulus size).
    pub wrapped_key_len: usize,
    /// Bytes the outermost layer encrypts: the next frame, or the plaintext.
    pub inner_len: usize,
}

/// Parses the outermost frame header. Does not decrypt anything.
pub fn inspect(envelope: &[u8]) -> Result<EnvelopeInfo> {
    let outer = crate::wire::decode_frame(envelope)?;
    Ok(EnvelopeInfo {
        total_len: envelope.len(),
        wrapped_key_len: outer.wrapped_key_len(),
        inner_len: outer.ciphertext.len(),
    })
}

// ---------------------------------------------------------------------------
// Façade
// ---------------------------------------------------------------------------

/// Layered envelope cipher over a key wrap provider.
#[derive(Clone, Debug, Default)]
pub struct Onion<W = RsaOaepProvider> {
    wrapper: W,
}

impl Onion<RsaOaepProvider> {
    pub fn new() -> Self {
        Self::default()
    }

    /// RSA-OAEP with a non-default modulus size.
    pub fn with_modulus_bits(bits: usize) -> Result<Self> {
        Ok(Self::with_provider(RsaOaepProvider::new(bits)?))
    }
}

impl<W: KeyWrapProvider> Onion<W> {
    pub fn with_provider(wrapper: W) -> Self {
        Self { wrapper }
    }

    /// Seals `plaintext` to a chain of public keys.
    pub fn seal<K: core::borrow::Borrow<PublicKey>>(
        &self,
        plaintext: &[u8],
        chain: &[Authority<K>],
        n: usize,
    ) -> Result<Vec<u8>> {
        seal_envelope(&self.wrapper, plaintext, chain, n)
    }

    /// Opens an envelope with the matching chain of private keys.
    pub fn open<K: core::borrow::Borrow<SecretKey>>(
        &self,
        envelope: &[u8],
        chain: &[Authority<K>],
        n: usize,
    ) -> Result<Vec<u8>> {
        open_envelope(&self.wrapper, envelope, chain, n)
    }
}

impl<W: KeyWrapProvider + Sync> Onion<W> {
    /// Generates keypairs for authorities `1..=n`.
    ///
    /// Keypairs are independent, so they are generated in parallel.
    pub fn generate_authorities(&self, n: usize) -> Result<Vec<AuthorityKeys>> {
        if n == 0 {
            return Err(Error::NoAuthorities);
        }
        let last = u32::try_from(n).map_err(|_| Error::TooManyAuthorities(n))?;

        (1..=last)
            .into_par_iter()
            .map(|index| {
                let (public, secret) = self.wrapper.keygen()?;
                debug!(authority = index, "generated keypair");
                Ok(AuthorityKeys { index, public, secret })
            })
            .collect()
    }
}
