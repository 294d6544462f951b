#![no_main]
use std::io::Cursor;

use libfuzzer_sys::fuzz_target;

use ferrotls_tls::record::RecordLayer;

fuzz_target!(|data: &[u8]| {
    let mut record_layer = RecordLayer::new();
    let mut cursor = Cursor::new(data.to_vec());
    while record_layer.read_full_record(&mut cursor).is_ok() {
        let available = record_layer.in_available();
        let _ = record_layer.take_in(available);
        record_layer.wipe_in();
    }
});
