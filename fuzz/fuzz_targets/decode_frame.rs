#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = onion_envelope::wire::decode_frame(data) {
        assert_eq!(frame.total_len(), data.len());
        assert_eq!(
            u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize,
            frame.wrapped_key_len()
        );
    }
});
