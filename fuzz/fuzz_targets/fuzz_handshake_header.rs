#![no_main]
use libfuzzer_sys::fuzz_target;

use ferrotls_tls::handshake::{table, HandshakeKind};

fuzz_target!(|data: &[u8]| {
    let _ = ferrotls_tls::handshake::parse_handshake_header(data);
    if let Some(&bits) = data.first() {
        if let Some(kind) = HandshakeKind::from_bits(bits & 0x7f) {
            let _ = kind.name();
            if let Some(seq) = table::sequence(kind) {
                assert!(!seq.is_empty());
            }
        }
    }
});
