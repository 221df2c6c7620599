//! Fuzz target: incremental HTTP header parsing.
//!
//! Feeds arbitrary bytes, split at an arbitrary point, into the header
//! parser and asserts it never panics and reports a body offset inside
//! the slice it was given.
//!
//! cargo fuzz run fuzz_header_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use otalink::download::http::{HeaderParser, HeaderProgress};

fuzz_target!(|input: (Vec<u8>, usize)| {
    let (data, split) = input;
    let split = split % (data.len() + 1);

    let mut parser = HeaderParser::new();
    for slice in [&data[..split], &data[split..]] {
        match parser.feed(slice) {
            Ok(HeaderProgress::Complete { body_offset }) => {
                assert!(body_offset <= slice.len());
                return;
            }
            Ok(HeaderProgress::Incomplete) => {}
            Err(_) => return,
        }
    }
});
