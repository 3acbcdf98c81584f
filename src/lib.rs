//! ricxfer: multiplexed channel messaging and chunked file/stream
//! transfer for embedded hosts.
//!
//! ```text
//!  driver bytes ─▶ comms::ChannelManager ─▶ exchange::ExchangeHub
//!                                               │
//!                        ports::RequestRouter ◀─┤
//!                                               ▼
//!                                   filestream::TransferSession
//!                                     │ Okto / Http / Datagram
//!                                     ▼
//!                   FirmwareUpdater / FileStore / stream sink
//! ```
//!
//! Everything outside the core is reached through [`ports`]. ESP-IDF
//! specifics (timer, OTA partitions) are behind the `espidf` feature.

#![deny(unused_must_use)]

pub mod adapters;
pub mod comms;
pub mod config;
pub mod error;
pub mod events;
pub mod exchange;
pub mod filestream;
pub mod ports;

pub use error::{Error, Result, TransferError};
pub use exchange::ExchangeHub;
