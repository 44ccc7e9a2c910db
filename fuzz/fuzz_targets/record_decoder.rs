#![no_main]

use libfuzzer_sys::fuzz_target;
use probecore::record::EventRecord;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode or report a malformed record, never panic
    if let Ok(record) = EventRecord::from_bytes(data) {
        let _ = record.to_string();
        assert_eq!(&record.to_bytes()[..], &data[..EventRecord::ENCODED_LEN]);
    }
});
