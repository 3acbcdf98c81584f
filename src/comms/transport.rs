//! Transport hooks a physical driver hands to the channel manager.
//!
//! Concrete drivers (UART, BLE GATT, web-socket, MQTT topic) provide:
//! - a [`SendFn`] that pushes one framed message onto the wire
//! - a [`ReadyPredicate`] reporting whether the link can take traffic now
//!
//! Closures implement both traits, so a driver can register with
//! `|msg| uart.write(&msg.payload).is_ok()` and
//! `|_| Readiness::Ready`.
//!
//! [`Outbound`] is the other direction: how protocol code hands a message
//! to whatever routes it onto a channel.

use super::message::WireMessage;

/// Outbound link state reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Link can accept a message now.
    Ready,
    /// Link is connected but its buffers are full.
    Busy,
    /// No peer connected; queued traffic should be drained, not held.
    NoConnection,
}

/// Push one framed message to the physical link.
pub trait SendFn: Send {
    /// Returns `false` if the driver could not send.
    fn send(&mut self, msg: &WireMessage) -> bool;
}

impl<F> SendFn for F
where
    F: FnMut(&WireMessage) -> bool + Send,
{
    fn send(&mut self, msg: &WireMessage) -> bool {
        self(msg)
    }
}

/// Query whether the link can take outbound traffic.
pub trait ReadyPredicate: Send {
    fn readiness(&mut self, channel_id: u32) -> Readiness;
}

impl<F> ReadyPredicate for F
where
    F: FnMut(u32) -> Readiness + Send,
{
    fn readiness(&mut self, channel_id: u32) -> Readiness {
        self(channel_id)
    }
}

/// Sink for outbound messages addressed by `channel_id`. Implemented by
/// the channel manager; engines and the hub send through it.
pub trait Outbound {
    fn send_msg(&mut self, msg: WireMessage);
}

impl Outbound for Vec<WireMessage> {
    fn send_msg(&mut self, msg: WireMessage) {
        self.push(msg);
    }
}

/// A sender that discards everything. Useful for channels that only
/// receive.
pub struct NullSend;

impl SendFn for NullSend {
    fn send(&mut self, _msg: &WireMessage) -> bool {
        true
    }
}

/// A predicate that is always ready.
pub struct AlwaysReady;

impl ReadyPredicate for AlwaysReady {
    fn readiness(&mut self, _channel_id: u32) -> Readiness {
        Readiness::Ready
    }
}
