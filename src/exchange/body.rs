//! Request-body reassembly.
//!
//! A url request may be preceded by body elements, each carrying its
//! offset and the total body size:
//!
//! ```text
//! Body{pos 0, total 9}  "abcd"
//! Body{pos 4, total 9}  "efghi"   → complete, held for the channel
//! Url "cfg/set"                   → router gets ("cfg/set", Some("abcdefghi"))
//! ```
//!
//! One partial body per channel. A fragment at offset 0 restarts
//! assembly; a fragment at any other unexpected offset drops it.

use crate::comms::ricrest::MAX_REST_BODY_SIZE;

struct PartialBody {
    channel_id: u32,
    total: u32,
    buf: Vec<u8>,
}

impl PartialBody {
    fn is_complete(&self) -> bool {
        self.buf.len() as u32 >= self.total
    }
}

/// Per-channel reassembly buffers.
pub struct BodyAssembler {
    parts: Vec<PartialBody>,
}

impl BodyAssembler {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    fn slot(&self, channel_id: u32) -> Option<usize> {
        self.parts.iter().position(|p| p.channel_id == channel_id)
    }

    /// Feed one fragment. Returns `true` once the body is complete.
    pub fn feed(&mut self, channel_id: u32, pos: u32, total: u32, data: &[u8]) -> bool {
        let total = total.min(MAX_REST_BODY_SIZE);
        if pos == 0 {
            self.reset(channel_id);
            self.parts.push(PartialBody {
                channel_id,
                total,
                buf: Vec::with_capacity(total as usize),
            });
        }
        let Some(i) = self.slot(channel_id) else {
            log::warn!("Exchange: body fragment @{} on chan {} with no start", pos, channel_id);
            return false;
        };
        let part = &mut self.parts[i];
        if pos != part.buf.len() as u32 || part.total != total {
            log::warn!(
                "Exchange: body fragment @{} on chan {}, expected @{}; dropped",
                pos,
                channel_id,
                part.buf.len()
            );
            self.parts.swap_remove(i);
            return false;
        }
        let room = (part.total as usize).saturating_sub(part.buf.len());
        part.buf.extend_from_slice(&data[..data.len().min(room)]);
        part.is_complete()
    }

    /// Hand over a completed body; partial bodies stay put.
    pub fn take_complete(&mut self, channel_id: u32) -> Option<Vec<u8>> {
        let i = self.slot(channel_id)?;
        if !self.parts[i].is_complete() {
            return None;
        }
        Some(self.parts.swap_remove(i).buf)
    }

    pub fn reset(&mut self, channel_id: u32) {
        self.parts.retain(|p| p.channel_id != channel_id);
    }

    /// Whether a body (partial or complete) is held for the channel.
    pub fn is_active(&self, channel_id: u32) -> bool {
        self.slot(channel_id).is_some()
    }
}

impl Default for BodyAssembler {
    fn default() -> Self {
        Self::new()
    }
}
