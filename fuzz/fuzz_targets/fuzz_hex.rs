#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data) {
        // decode must never panic; a successful decode re-encodes to its digits
        if let Ok(bytes) = dbrepair::hexcodec::decode(s) {
            let digits: String = s.chars().filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\n')).collect();
            assert_eq!(dbrepair::hexcodec::encode(&bytes), digits.to_ascii_lowercase());
        }
    }
});
