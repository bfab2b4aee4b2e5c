//! Layer frame wire format
//!
//! Format:
//!   wrapped_key_len[4, u32 BE] || wrapped_key[wrapped_key_len]
//!   || iv[16] || tag[16] || ciphertext[..]
//!
//! There is no ciphertext length: the ciphertext is the rest of the buffer.
//! A frame is therefore only valid as the whole of its buffer, which is what
//! lets an outer layer carry an inner frame as opaque ciphertext.

use crate::error::{FrameError, Result};

/// Width of the big-endian wrapped-key length prefix.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// AES-256 key size.
pub const SYMMETRIC_KEY_BYTES: usize = 32;

/// IV, used directly as the GCM nonce.
pub const IV_BYTES: usize = 16;

/// GCM authentication tag, stored right after the IV.
pub const TAG_BYTES: usize = 16;

/// Bytes a frame adds on top of the wrapped key and the payload.
pub const FIXED_OVERHEAD_BYTES: usize = LENGTH_PREFIX_BYTES + IV_BYTES + TAG_BYTES; // 36

/// Borrowed view of a parsed layer frame.
#[derive(Debug, Clone, Copy)]
pub struct LayerFrame<'a> {
    /// Length prefix + wrapped key, authenticated as GCM associated data.
    pub header: &'a [u8],
    pub wrapped_key: &'a [u8],
    pub iv: &'a [u8; IV_BYTES],
    pub tag: &'a [u8; TAG_BYTES],
    pub ciphertext: &'a [u8],
}

impl LayerFrame<'_> {
    /// Value of the length prefix (always `wrapped_key.len()`).
    pub fn wrapped_key_len(&self) -> usize {
        self.wrapped_key.len()
    }

    /// Total frame length.
    pub fn total_len(&self) -> usize {
        self.header.len() + IV_BYTES + TAG_BYTES + self.ciphertext.len()
    }
}

/// Byte length of a frame wrapping `payload_len` bytes with a
/// `wrapped_key_len`-byte wrapped key.
pub const fn frame_len(wrapped_key_len: usize, payload_len: usize) -> usize {
    FIXED_OVERHEAD_BYTES + wrapped_key_len + payload_len
}

pub fn decode_frame(data: &[u8]) -> Result<LayerFrame<'_>> {
    let Some(prefix) = data.get(..LENGTH_PREFIX_BYTES) else {
        return Err(FrameError::MissingLength { len: data.len() }.into());
    };
    let wrapped_key_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;

    let tag_end = wrapped_key_len
        .checked_add(FIXED_OVERHEAD_BYTES)
        .ok_or(FrameError::Oversized { len: wrapped_key_len })?;
    let key_end = LENGTH_PREFIX_BYTES + wrapped_key_len;
    let iv_end = key_end + IV_BYTES;

    if data.len() < tag_end {
        return Err(FrameError::Truncated {
            needed: tag_end,
            available: data.len(),
        }
        .into());
    }

    let iv: &[u8; IV_BYTES] = data[key_end..iv_end]
        .try_into()
        .map_err(|_| FrameError::Truncated { needed: tag_end, available: data.len() })?;
    let tag: &[u8; TAG_BYTES] = data[iv_end..tag_end]
        .try_into()
        .map_err(|_| FrameError::Truncated { needed: tag_end, available: data.len() })?;

    Ok(LayerFrame {
        header: &data[..key_end],
        wrapped_key: &data[LENGTH_PREFIX_BYTES..key_end],
        iv,
        tag,
        ciphertext: &data[tag_end..],
    })
}

/// Writes the length prefix and wrapped key: the associated data of the layer.
pub fn encode_header(wrapped_key: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(wrapped_key.len())
        .map_err(|_| FrameError::Oversized { len: wrapped_key.len() })?;

    let mut out = Vec::with_capacity(LENGTH_PREFIX_BYTES + wrapped_key.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(wrapped_key);
    Ok(out)
}

/// Appends IV, tag and ciphertext to an encoded header.
pub fn encode_frame(
    mut header: Vec<u8>,
    iv: &[u8; IV_BYTES],
    tag: &[u8; TAG_BYTES],
    ciphertext: &[u8],
) -> Vec<u8> {
    header.reserve_exact(IV_BYTES + TAG_BYTES + ciphertext.len());
    header.extend_from_slice(iv);
    header.extend_from_slice(tag);
    header.extend_from_slice(ciphertext);
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample(wrapped: &[u8], payload: &[u8]) -> Vec<u8> {
        let header = encode_header(wrapped).unwrap();
        encode_frame(header, &[0x11; IV_BYTES], &[0x22; TAG_BYTES], payload)
    }

    #[test]
    fn prefix_matches_wrapped_key_region() {
        let frame = sample(&[0xAB; 256], b"payload");
        assert_eq!(&frame[..4], &256u32.to_be_bytes());

        let parts = decode_frame(&frame).unwrap();
        assert_eq!(parts.wrapped_key_len(), 256);
        assert!(parts.wrapped_key.iter().all(|b| *b == 0xAB));
        assert_eq!(parts.iv, &[0x11; IV_BYTES]);
        assert_eq!(parts.tag, &[0x22; TAG_BYTES]);
        assert_eq!(parts.ciphertext, b"payload");
        assert_eq!(parts.total_len(), frame.len());
        assert_eq!(frame.len(), frame_len(256, 7));
    }

    #[test]
    fn empty_ciphertext_is_legal() {
        let frame = sample(&[1, 2, 3], b"");
        let parts = decode_frame(&frame).unwrap();
        assert!(parts.ciphertext.is_empty());
    }

    #[test]
    fn rejects_missing_length() {
        assert_eq!(
            decode_frame(&[0, 0, 1]).unwrap_err(),
            Error::Frame(FrameError::MissingLength { len: 3 })
        );
        assert!(matches!(
            decode_frame(&[]),
            Err(Error::Frame(FrameError::MissingLength { len: 0 }))
        ));
    }

    #[test]
    fn rejects_short_of_declared_fields() {
        let frame = sample(&[7; 64], b"");
        let short = &frame[..frame.len() - 1];
        assert_eq!(
            decode_frame(short).unwrap_err(),
            Error::Frame(FrameError::Truncated {
                needed: frame.len(),
                available: frame.len() - 1,
            })
        );
    }

    #[test]
    fn rejects_length_prefix_past_end() {
        let mut frame = sample(&[7; 8], b"abc");
        frame[..4].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            decode_frame(&frame),
            Err(Error::Frame(FrameError::Truncated { .. }))
        ));
    }
}
