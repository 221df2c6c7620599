//! Fuzz target: firmware URL parsing.
//!
//! The URL is copied out of an attacker-controlled announcement.  The
//! parser must never panic, and anything it accepts must be a usable
//! http(s) endpoint.
//!
//! cargo fuzz run fuzz_url

#![no_main]

use libfuzzer_sys::fuzz_target;
use otalink::download::url;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(parsed) = url::parse(s) {
        assert!(!parsed.host.is_empty());
        assert!(parsed.path.starts_with('/'));
    }
});
