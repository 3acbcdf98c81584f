//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter      | Implements | Connects to                      |
//! |--------------|------------|----------------------------------|
//! | `file_store` | FileStore  | a directory through `std::fs`    |
//! | `log_sink`   | EventSink  | serial log output                |
//! | `time`       | Clock      | ESP32 system timer / `Instant`   |
//!
//! The firmware updater lives with the transfer code in
//! [`crate::filestream::firmware`].

pub mod file_store;
pub mod log_sink;
pub mod time;
