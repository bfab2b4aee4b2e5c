//! Layer frame layout tests (single layer, real keys)

use onion_envelope::wire::{
    decode_frame, frame_len, FIXED_OVERHEAD_BYTES, IV_BYTES, LENGTH_PREFIX_BYTES,
    SYMMETRIC_KEY_BYTES, TAG_BYTES,
};
use onion_envelope::{
    open_layer, seal_layer, Error, FrameError, KeySource, KeyWrapProvider, RsaOaepProvider,
};

#[test]
fn test_wire_constants() {
    assert_eq!(LENGTH_PREFIX_BYTES, 4);
    assert_eq!(IV_BYTES, 16);
    assert_eq!(TAG_BYTES, 16);
    assert_eq!(SYMMETRIC_KEY_BYTES, 32);
    assert_eq!(FIXED_OVERHEAD_BYTES, 4 + 16 + 16);
    assert_eq!(frame_len(256, 14), 4 + 256 + 16 + 16 + 14);
}

#[test]
fn test_frame_structure() {
    let provider = RsaOaepProvider::default();
    let (pk, sk) = provider.generate_keypair().unwrap();

    let frame = seal_layer(&provider, &pk, b"test").unwrap();
    let parts = decode_frame(&frame).unwrap();

    assert_eq!(u32::from_be_bytes(frame[..4].try_into().unwrap()), 256);
    assert_eq!(parts.wrapped_key_len(), 256);
    assert_eq!(parts.wrapped_key, &frame[4..260]);
    assert_eq!(parts.iv.as_slice(), &frame[260..276]);
    assert_eq!(parts.tag.as_slice(), &frame[276..292]);
    assert_eq!(parts.ciphertext.len(), 4);
    assert_eq!(parts.header, &frame[..260]);

    assert_eq!(open_layer(&provider, &sk, &frame).unwrap(), b"test");
}

#[test]
fn test_wrapped_key_is_oaep_sha256() {
    let provider = RsaOaepProvider::default();
    let (pk, sk) = provider.keygen().unwrap();

    let frame = seal_layer(&provider, &pk, b"").unwrap();
    let parts = decode_frame(&frame).unwrap();

    let key = provider.unwrap_key(&sk, parts.wrapped_key).unwrap();
    assert_eq!(key.len(), SYMMETRIC_KEY_BYTES);
}

#[test]
fn test_rejects_short_buffers() {
    let provider = RsaOaepProvider::default();
    let (pk, sk) = provider.keygen().unwrap();
    let frame = seal_layer(&provider, &pk, b"").unwrap();

    for cut in [0, 1, 3] {
        assert_eq!(
            open_layer(&provider, &sk, &frame[..cut]),
            Err(Error::Frame(FrameError::MissingLength { len: cut }))
        );
    }
    for cut in [4, 100, 4 + 256 + IV_BYTES, frame.len() - 1] {
        assert!(matches!(
            open_layer(&provider, &sk, &frame[..cut]),
            Err(Error::Frame(FrameError::Truncated { .. }))
        ));
    }
}

#[test]
fn test_tampered_length_prefix() {
    let provider = RsaOaepProvider::default();
    let (pk, sk) = provider.keygen().unwrap();
    let mut frame = seal_layer(&provider, &pk, b"abc").unwrap();

    // Shorter declared length: the key region no longer parses as OAEP.
    frame[3] = 255;
    frame[2] = 0;
    assert_eq!(open_layer(&provider, &sk, &frame), Err(Error::Decryption));
}

#[test]
fn test_uniform_decryption_errors() {
    let provider = RsaOaepProvider::default();
    let (pk, sk) = provider.keygen().unwrap();
    let (_, other) = provider.keygen().unwrap();
    let frame = seal_layer(&provider, &pk, b"secret").unwrap();

    let mut bad_tag = frame.clone();
    bad_tag[4 + 256 + IV_BYTES] ^= 0x01;
    let mut bad_ct = frame.clone();
    let last = bad_ct.len() - 1;
    bad_ct[last] ^= 0x01;

    let errors = [
        open_layer(&provider, &other, &frame).unwrap_err(),
        open_layer(&provider, &sk, &bad_tag).unwrap_err(),
        open_layer(&provider, &sk, &bad_ct).unwrap_err(),
    ];
    for e in &errors {
        assert_eq!(e, &Error::Decryption);
        assert_eq!(e.to_string(), "decryption failed");
    }
}
