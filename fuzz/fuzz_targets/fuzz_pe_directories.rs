#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Drive the directory decoders and tree view as well; hostile
    // offsets and counts must stay bounded.
    if let Ok(mut pe) = binform::Pe::parse(data.to_vec()) {
        let _ = pe.to_tree();
    }
});
