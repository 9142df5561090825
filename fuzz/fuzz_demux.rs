//! Fuzz target for the stdout/stderr frame demultiplexer.
//!
//! Run with: cargo +nightly fuzz run fuzz_demux
//!
//! The first byte picks a chunk size so frame headers land at arbitrary
//! split points.

#![no_main]

use dockline_core::stream::Demuxer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(split).max(1);

    let mut demuxer = Demuxer::new();
    let mut payload = 0usize;
    for piece in rest.chunks(chunk) {
        demuxer.push(piece);
        loop {
            match demuxer.next_frame() {
                Ok(Some(frame)) => payload += frame.bytes().len(),
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
    let _ = demuxer.finish();
    assert!(payload <= rest.len());
});
