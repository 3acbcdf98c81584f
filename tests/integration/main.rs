//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the exchange hub end to
//! end against mock port adapters. All tests run on the host with no
//! transport hardware.

mod mock_ports;
mod stream_tests;
mod upload_flow_tests;
