//! Configuration parameters
//!
//! Per-channel queue/block limits and the transfer tunables. Values can be
//! loaded from JSON (host tooling) or from a postcard blob kept in
//! non-volatile storage.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Queue and block limits for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Preferred inbound block length (bytes) advertised to peers.
    pub inbound_block_len: usize,
    /// Largest inbound block the channel can carry.
    pub inbound_block_len_max: usize,
    /// Maximum number of raw frames waiting in the inbound queue.
    pub inbound_queue_count_max: usize,
    /// Maximum total bytes waiting in the inbound queue.
    pub inbound_queue_bytes_max: usize,
    /// Outbound block length (bytes).
    pub outbound_block_len: usize,
    /// Maximum number of messages waiting in the outbound queue.
    pub outbound_queue_max_len: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            inbound_block_len: 1200,
            inbound_block_len_max: 5000,
            inbound_queue_count_max: 20,
            inbound_queue_bytes_max: 20_000,
            outbound_block_len: 5000,
            outbound_queue_max_len: 20,
        }
    }
}

impl ChannelSettings {
    /// Settings with a specific inbound block length, everything else default.
    pub fn with_inbound_block_len(inbound_block_len: usize) -> Self {
        Self {
            inbound_block_len,
            ..Self::default()
        }
    }
}

/// Chunked-upload (OKTO) tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Block size when the host proposes none.
    pub block_size_default: u32,
    /// Batch-ack size when the host proposes none.
    pub batch_ack_default: u32,
    /// Ceiling on `block_size * batch_ack_size`.
    pub max_total_bytes_in_batch: u32,
    /// Silence allowed before the second accepted block (ms).
    pub first_msg_timeout_ms: u64,
    /// Silence allowed between later blocks (ms).
    pub block_msgs_timeout_ms: u64,
    /// Timeout count that cancels the upload.
    pub max_retries: u32,
    /// Whole-upload ceiling (ms).
    pub upload_fail_timeout_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            block_size_default: 5000,
            batch_ack_default: 40,
            max_total_bytes_in_batch: 50_000,
            first_msg_timeout_ms: 5000,
            block_msgs_timeout_ms: 1000,
            max_retries: 5,
            upload_fail_timeout_ms: 2 * 60 * 60 * 1000, // 2 h
        }
    }
}

/// Exchange hub configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Concurrent transfer sessions.
    pub max_sessions: usize,
    /// Idle time after which a session is reaped (ms).
    pub session_idle_timeout_ms: u64,
    /// Maximum url / response string length decoded from a frame.
    pub max_payload_len: usize,
    pub upload: UploadConfig,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            max_sessions: crate::filestream::MAX_SESSIONS,
            session_idle_timeout_ms: 10_000,
            max_payload_len: crate::comms::ricrest::MAX_PAYLOAD_LEN,
            upload: UploadConfig::default(),
        }
    }
}

impl ExchangeConfig {
    /// Reject combinations the engines cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 || self.max_sessions > crate::filestream::MAX_SESSIONS {
            return Err(Error::Config("max_sessions out of range"));
        }
        if self.upload.block_size_default == 0 || self.upload.batch_ack_default == 0 {
            return Err(Error::Config("block and batch sizes must be non-zero"));
        }
        if self.upload.block_size_default > self.upload.max_total_bytes_in_batch {
            return Err(Error::Config("default block exceeds batch ceiling"));
        }
        if self.upload.first_msg_timeout_ms < self.upload.block_msgs_timeout_ms {
            return Err(Error::Config("first-block timeout shorter than block timeout"));
        }
        if self.upload.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1"));
        }
        Ok(())
    }

    /// Load from a JSON document; missing sections are an error.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|_| Error::Config("malformed JSON config"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a postcard blob (as stored in NVS).
    pub fn from_postcard(bytes: &[u8]) -> Result<Self> {
        let cfg: Self =
            postcard::from_bytes(bytes).map_err(|_| Error::Config("malformed postcard config"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
