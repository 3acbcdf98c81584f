//! Channel layer: wire frames, codecs, channels and their manager.
//!
//! ```text
//! ┌──────────┐ bytes ┌─────────┐ bytes ┌───────┐ WireMessage ┌──────────┐
//! │ driver   │──────▶│ channel │──────▶│ codec │────────────▶│ exchange │
//! │ (UART,   │◀──────│ queues  │◀──────│       │◀────────────│ hub      │
//! │  BLE, WS)│ SendFn└─────────┘       └───────┘             └──────────┘
//! └──────────┘
//! ```
//!
//! RICREST element frames ([`ricrest`]) ride inside the codec payload.

pub mod channel;
pub mod codec;
pub mod crc;
pub mod cursor;
pub mod manager;
pub mod message;
pub mod response;
pub mod ricframe;
pub mod ricjson;
pub mod ricrest;
pub mod ricserial;
pub mod transport;

pub use channel::{Channel, InboundHandle};
pub use manager::ChannelManager;
pub use message::{MsgProtocol, MsgType, WireMessage};
pub use transport::{Outbound, Readiness, ReadyPredicate, SendFn};
