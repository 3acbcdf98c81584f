//! Firmware updater backed by `esp-ota`.
//!
//! Flow: start (first block) → N × write_block → final block or
//! cancel_end(true) → finalize → set boot partition
//!
//! With the `espidf` feature the image goes to the inactive OTA partition.
//! Otherwise it is collected in memory so the whole path can be exercised
//! on the host. Either way a running CRC16 is kept and checked against the
//! `CRC16` the host declared in `ufStart`, when there was one.

use log::{info, warn};

use crate::comms::crc;
use crate::error::TransferError;
use crate::ports::FirmwareUpdater;

use super::FileStreamBlock;

const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024; // 4 MB

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving {
        expected_size: u32,
        bytes_written: u32,
    },
    ReadyToReboot,
    Failed,
}

pub struct OtaUpdater {
    state: OtaState,
    crc: u16,
    expected_crc: Option<u16>,
    #[cfg(feature = "espidf")]
    ota_update: Option<esp_ota::OtaUpdate>,
    #[cfg(not(feature = "espidf"))]
    image: Vec<u8>,
}

impl OtaUpdater {
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
            crc: crc::CRC16_INIT,
            expected_crc: None,
            #[cfg(feature = "espidf")]
            ota_update: None,
            #[cfg(not(feature = "espidf"))]
            image: Vec::new(),
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Image received so far (host builds only).
    #[cfg(not(feature = "espidf"))]
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    fn begin(&mut self, len: u32) -> Result<(), TransferError> {
        #[cfg(feature = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("OTA: begin failed: {:?}", e);
                TransferError::CannotStart
            })?;
            self.ota_update = Some(update);
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.image.clear();
            self.image.reserve(len as usize);
        }
        Ok(())
    }

    fn write_image(&mut self, data: &[u8]) -> Result<(), TransferError> {
        #[cfg(feature = "espidf")]
        {
            let Some(update) = self.ota_update.as_mut() else {
                return Err(TransferError::NotUploading);
            };
            update.write(data).map_err(|e| {
                warn!("OTA: write failed: {:?}", e);
                TransferError::WriteFailed
            })?;
        }
        #[cfg(not(feature = "espidf"))]
        self.image.extend_from_slice(data);
        Ok(())
    }

    /// Verify the image and make it the boot image.
    fn finalize(&mut self) -> Result<(), TransferError> {
        let bytes_written = match self.state {
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } if bytes_written == expected_size => bytes_written,
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } => {
                warn!("OTA: ended at {} of {} bytes", bytes_written, expected_size);
                self.abort();
                self.state = OtaState::Failed;
                return Err(TransferError::IncompleteTransfer);
            }
            _ => return Err(TransferError::NotUploading),
        };
        if let Some(expected) = self.expected_crc.filter(|&c| c != self.crc) {
            warn!("OTA: crc {:#06x} != declared {:#06x}", self.crc, expected);
            self.abort();
            self.state = OtaState::Failed;
            return Err(TransferError::WriteFailed);
        }

        #[cfg(feature = "espidf")]
        {
            let Some(update) = self.ota_update.take() else {
                self.state = OtaState::Failed;
                return Err(TransferError::NotUploading);
            };
            let mut completed = update.finalize().map_err(|e| {
                warn!("OTA: finalize failed: {:?}", e);
                self.state = OtaState::Failed;
                TransferError::WriteFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("OTA: set_as_boot_partition failed: {:?}", e);
                self.state = OtaState::Failed;
                TransferError::WriteFailed
            })?;
        }

        self.state = OtaState::ReadyToReboot;
        info!("OTA: finalized {} bytes, ready to reboot", bytes_written);
        Ok(())
    }

    fn abort(&mut self) {
        #[cfg(feature = "espidf")]
        {
            // Dropping the update aborts it
            self.ota_update.take();
        }
        self.state = OtaState::Idle;
        warn!("OTA: aborted");
    }
}

impl Default for OtaUpdater {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwareUpdater for OtaUpdater {
    fn start(&mut self, name: &str, len: u32) -> Result<(), TransferError> {
        if self.is_busy() {
            return Err(TransferError::AlreadyInProgress);
        }
        if len == 0 || len > MAX_FIRMWARE_SIZE {
            warn!("OTA: {} size {} out of range", name, len);
            return Err(TransferError::CannotStart);
        }
        self.begin(len)?;
        self.crc = crc::CRC16_INIT;
        self.expected_crc = None;
        self.state = OtaState::Receiving {
            expected_size: len,
            bytes_written: 0,
        };
        info!("OTA: begin {} ({} bytes)", name, len);
        Ok(())
    }

    fn write_block(&mut self, block: &FileStreamBlock<'_>) -> Result<(), TransferError> {
        let OtaState::Receiving {
            expected_size,
            bytes_written,
        } = self.state
        else {
            return Err(TransferError::NotUploading);
        };
        if block.file_pos != bytes_written {
            return Err(TransferError::PositionMismatch);
        }
        let new_written = bytes_written + block.len();
        if new_written > expected_size {
            self.abort();
            return Err(TransferError::WriteFailed);
        }
        if let Err(e) = self.write_image(block.data) {
            self.abort();
            return Err(e);
        }

        self.crc = crc::update_slice(self.crc, block.data);
        if block.crc16.is_some() {
            self.expected_crc = block.crc16;
        }
        self.state = OtaState::Receiving {
            expected_size,
            bytes_written: new_written,
        };
        if block.final_block {
            self.finalize()?;
        }
        Ok(())
    }

    fn cancel_end(&mut self, is_normal_end: bool) {
        if !self.is_busy() {
            return;
        }
        if !is_normal_end {
            self.abort();
            return;
        }
        if let Err(e) = self.finalize() {
            warn!("OTA: end failed: {}", e);
        }
    }

    fn is_busy(&self) -> bool {
        matches!(self.state, OtaState::Receiving { .. })
    }
}

// ── Tests ─────────────────────────────────────────────────────
