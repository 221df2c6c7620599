//! Integration test driver for `tests/integration/`.
//!
//! Each `mod` below maps to a file that exercises a subsystem against mock
//! adapters.  All tests run on the host with no broker, origin server, or
//! flash hardware.

mod agent_tests;
mod control_tests;
mod download_tests;
mod mock_hw;
