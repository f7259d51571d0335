#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the parser, only produce errors
    // or partial documents.
    let _ = binform::Pe::parse(data.to_vec());
});
