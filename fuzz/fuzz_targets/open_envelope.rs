#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;
use onion_envelope::{AuthorityKeys, Onion};

static AUTHORITIES: Lazy<Vec<AuthorityKeys>> = Lazy::new(|| {
    Onion::with_modulus_bits(1024)
        .and_then(|onion| onion.generate_authorities(2))
        .unwrap_or_default()
});

fuzz_target!(|data: &[u8]| {
    if data.is_empty() || AUTHORITIES.is_empty() {
        return;
    }

    // First byte picks how many layers to peel.
    let n = 1 + (data[0] as usize) % AUTHORITIES.len();
    let envelope = &data[1..];

    let onion = Onion::new();
    let chain: Vec<_> = AUTHORITIES[..n].iter().map(AuthorityKeys::secret).collect();
    let _ = onion.open(envelope, &chain, n);
});
