//! Fuzz target: announcement parsing.
//!
//! The announcement payload arrives from the broker and is fully
//! attacker-controlled.  The parser must never panic, and anything it
//! accepts must satisfy the field requirements.
//!
//! cargo fuzz run fuzz_announcement

#![no_main]

use libfuzzer_sys::fuzz_target;
use otalink::agent::announcement;

fuzz_target!(|data: &[u8]| {
    if let Ok(Some(ann)) = announcement::parse(data) {
        assert_eq!(ann.command, "update");
        assert!(!ann.version.is_empty());
        assert!(!ann.firmware_url.is_empty());
        assert!(!ann.checksum.is_empty());
    }
});
