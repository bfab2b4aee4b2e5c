//! AEAD: AES-256-GCM with a 128-bit IV and detached tag

use aes_gcm::{
    aead::{consts::U16, AeadInPlace, KeyInit},
    aes::Aes256,
    AesGcm, Nonce, Tag,
};
use getrandom::getrandom;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::wire::{IV_BYTES, SYMMETRIC_KEY_BYTES, TAG_BYTES};

/// AES-256-GCM keyed for the 16-byte IV carried in every frame.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Fresh per-layer symmetric key. Wiped on drop.
pub fn key() -> Result<Zeroizing<[u8; SYMMETRIC_KEY_BYTES]>> {
    let mut k = Zeroizing::new([0u8; SYMMETRIC_KEY_BYTES]);
    getrandom(&mut k[..]).map_err(|_| Error::Rng)?;
    Ok(k)
}

/// Fresh per-layer IV. Used during encryption only.
pub fn iv() -> Result<[u8; IV_BYTES]> {
    let mut n = [0u8; IV_BYTES];
    getrandom(&mut n).map_err(|_| Error::Rng)?;
    Ok(n)
}

/// AEAD seal (encrypt path). Returns `(ciphertext, tag)`.
pub fn seal(
    key: &[u8; SYMMETRIC_KEY_BYTES],
    iv: &[u8; IV_BYTES],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_BYTES])> {
    let cipher = Aes256Gcm16::new_from_slice(key).map_err(Error::key)?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(iv), aad, &mut buffer)
        .map_err(|_| Error::Key("symmetric encryption failed".into()))?;
    let mut out = [0u8; TAG_BYTES];
    out.copy_from_slice(&tag);
    Ok((buffer, out))
}

/// AEAD open (decrypt path). Any failure is a uniform decryption error.
pub fn open(
    key: &[u8],
    iv: &[u8; IV_BYTES],
    tag: &[u8; TAG_BYTES],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm16::new_from_slice(key).map_err(|_| Error::Decryption)?;
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(iv),
            aad,
            &mut buffer,
            Tag::<U16>::from_slice(tag),
        )
        .map_err(|_| Error::Decryption)?;
    Ok(buffer)
}
