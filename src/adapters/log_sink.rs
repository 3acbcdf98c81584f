//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing transfer events to the logger
//! (UART / USB-CDC in production). A publish-topic adapter would
//! implement the same trait.

use log::info;

use crate::events::TransferEvent;
use crate::ports::EventSink;

/// Adapter that logs every [`TransferEvent`].
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &TransferEvent) {
        match event {
            TransferEvent::SessionOpened {
                stream_id,
                channel_id,
                name,
                content,
                flow,
            } => {
                info!(
                    "XFER | open stream={} chan={} name={} content={} flow={}",
                    stream_id,
                    channel_id,
                    name,
                    content.as_str(),
                    flow.as_str()
                );
            }
            TransferEvent::SessionClosed { stream_id, name } => {
                info!("XFER | close stream={} name={}", stream_id, name);
            }
            TransferEvent::ActivityChanged(a) => {
                info!(
                    "XFER | activity fw={} fs={} stream={}",
                    u8::from(a.firmware),
                    u8::from(a.file_system),
                    u8::from(a.streaming)
                );
            }
        }
    }
}
