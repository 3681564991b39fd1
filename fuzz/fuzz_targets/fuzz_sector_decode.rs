//! Fuzz target: `kanban::decode_sector`
//!
//! Arbitrary raw sector bytes must decode to a trimmed, printable string
//! that fits in one sector, and re-encoding a non-empty result must decode
//! back to the same code.
//!
//! cargo fuzz run fuzz_sector_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use threadgate::kanban::{decode_sector, encode_sector, SECTOR_SIZE};

fuzz_target!(|data: &[u8]| {
    let code = decode_sector(data);

    assert!(code.len() <= SECTOR_SIZE);
    assert!(code.bytes().all(|b| (32..=126).contains(&b)));
    assert_eq!(code.trim(), code.as_str(), "decoded code must be trimmed");

    if !code.is_empty() {
        let raw = encode_sector(&code).expect("decoded code is always encodable");
        assert_eq!(decode_sector(&raw), code);
    }
});
