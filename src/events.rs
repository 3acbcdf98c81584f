//! Transfer events published by the exchange hub.
//!
//! The hub emits these through the [`EventSink`](crate::ports::EventSink)
//! port once per change, never per block. Adapters decide where they go
//! (serial log, a status LED pattern, a publish topic).

use crate::filestream::{ContentType, FlowType};

/// Which kinds of transfer are currently running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Activity {
    pub firmware: bool,
    pub file_system: bool,
    pub streaming: bool,
}

impl Activity {
    pub fn any(&self) -> bool {
        self.firmware || self.file_system || self.streaming
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// A session was created.
    SessionOpened {
        stream_id: u32,
        channel_id: u32,
        name: String,
        content: ContentType,
        flow: FlowType,
    },

    /// A session was reaped.
    SessionClosed { stream_id: u32, name: String },

    /// The set of running transfer kinds changed.
    ActivityChanged(Activity),
}
