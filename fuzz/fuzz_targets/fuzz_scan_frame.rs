//! Fuzz target: `FrameAccumulator::push`
//!
//! Drives arbitrary byte streams through the scanner frame parser and
//! asserts that the payload stays printable and bounded, that nothing is
//! accepted after the terminator, and that a reset fully rearms it.
//!
//! cargo fuzz run fuzz_scan_frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use threadgate::scan::{ByteClass, FrameAccumulator, MAX_PAYLOAD};

fuzz_target!(|data: &[u8]| {
    let Some((&header_len, stream)) = data.split_first() else {
        return;
    };
    let mut frame = FrameAccumulator::new(usize::from(header_len % 16));

    for &byte in stream {
        let was_terminated = frame.is_terminated();
        let class = frame.push(byte);
        if was_terminated {
            assert_eq!(class, ByteClass::Ignored, "bytes after terminator must be dropped");
        }
    }

    let payload = frame.payload();
    assert!(payload.len() <= MAX_PAYLOAD);
    assert!(payload.bytes().all(|b| (32..=126).contains(&b)));
    if frame.is_terminated() {
        assert!(!payload.is_empty(), "terminated frame must carry a payload");
    }

    // After a reset the accumulator must behave like a fresh one.
    frame.reset();
    let mut fresh = FrameAccumulator::new(usize::from(header_len % 16));
    for &byte in stream {
        assert_eq!(frame.push(byte), fresh.push(byte));
    }
    assert_eq!(frame.payload(), fresh.payload());
});
