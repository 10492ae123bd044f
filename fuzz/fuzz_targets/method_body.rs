#![no_main]

use libfuzzer_sys::fuzz_target;
use ownerscope::assembly::{decode_method, encode_method, NullResolver};

fuzz_target!(|data: &[u8]| {
    if let Ok(il) = decode_method(data, &NullResolver) {
        let _ = encode_method(&il);
    }
});
