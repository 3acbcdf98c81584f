//! Block sink: where an engine hands each accepted block.

use crate::error::TransferError;

use super::FileStreamBlock;

/// Consumer of transfer blocks.
///
/// `write_block` returning [`TransferError::Busy`] asks the sender to
/// resend later; any other error fails the transfer.
pub trait BlockSink {
    fn write_block(&mut self, block: &FileStreamBlock<'_>) -> Result<(), TransferError>;

    /// Transfer finished (`true`) or was abandoned (`false`).
    fn cancel_end(&mut self, is_normal_end: bool);

    fn is_ready(&self) -> bool {
        true
    }
}

/// In-memory sink. Collects bytes and can be told to fail.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub data: Vec<u8>,
    pub blocks: u32,
    /// Error returned by the next writes instead of storing.
    pub fail_with: Option<TransferError>,
    /// `Some(normal)` once the transfer ended.
    pub ended: Option<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockSink for MemorySink {
    fn write_block(&mut self, block: &FileStreamBlock<'_>) -> Result<(), TransferError> {
        if let Some(e) = self.fail_with {
            return Err(e);
        }
        self.data.extend_from_slice(block.data);
        self.blocks += 1;
        Ok(())
    }

    fn cancel_end(&mut self, is_normal_end: bool) {
        self.ended = Some(is_normal_end);
    }
}
