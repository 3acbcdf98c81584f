//! Unified error types for the comms and file-stream subsystem.
//!
//! A single `Error` enum that every layer can convert into, with the
//! transfer taxonomy kept separate so engines and sinks can return it
//! without dragging decode or codec details along. All variants are
//! `Copy` so results can be passed through the service loop freely.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A wire frame could not be decoded.
    Decode(DecodeError),
    /// A transfer operation failed.
    Transfer(TransferError),
    /// A protocol codec rejected a frame.
    Codec(CodecError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Transfer(e) => write!(f, "transfer: {e}"),
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Frame decode errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Zero-length buffer; not even an element code.
    Empty,
    /// Fewer bytes than the element's fixed header requires.
    Truncated { needed: usize, available: usize },
    /// Leading byte is not a known element code.
    UnknownElementCode(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty frame"),
            Self::Truncated { needed, available } => {
                write!(f, "truncated frame (need {needed} bytes, have {available})")
            }
            Self::UnknownElementCode(code) => write!(f, "unknown element code {code}"),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Transfer errors
// ---------------------------------------------------------------------------

/// Outcome taxonomy shared by engines, sessions, sinks and the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    SessionNotFound,
    AlreadyInProgress,
    PositionMismatch,
    /// Sink cannot take data right now; the sender should retry.
    Busy,
    InvalidOperation,
    /// Session table full.
    InsufficientResource,
    /// Sink refused the first block.
    CannotStart,
    WriteFailed,
    /// Image ended before all declared bytes arrived.
    IncompleteTransfer,
    Timeout,
    NotUploading,
    InvalidObject,
    OtherFailure,
}

impl TransferError {
    /// Short camelCase code echoed to peers in `"reason"` fields.
    pub const fn code(self) -> &'static str {
        match self {
            Self::SessionNotFound => "sessionNotFound",
            Self::AlreadyInProgress => "alreadyInProgress",
            Self::PositionMismatch => "posMismatch",
            Self::Busy => "busy",
            Self::InvalidOperation => "invalidOperation",
            Self::InsufficientResource => "insufficientResource",
            Self::CannotStart => "cannotStart",
            Self::WriteFailed => "writeFailed",
            Self::IncompleteTransfer => "incompleteTransfer",
            Self::Timeout => "timeout",
            Self::NotUploading => "notUploading",
            Self::InvalidObject => "invalidObject",
            Self::OtherFailure => "otherFailure",
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound => write!(f, "no matching transfer session"),
            Self::AlreadyInProgress => write!(f, "transfer already in progress"),
            Self::PositionMismatch => write!(f, "block position does not match expected"),
            Self::Busy => write!(f, "sink busy"),
            Self::InvalidOperation => write!(f, "invalid operation"),
            Self::InsufficientResource => write!(f, "session table full"),
            Self::CannotStart => write!(f, "sink refused to start"),
            Self::WriteFailed => write!(f, "block write failed"),
            Self::IncompleteTransfer => write!(f, "transfer ended short of declared size"),
            Self::Timeout => write!(f, "timed out"),
            Self::NotUploading => write!(f, "no upload in progress"),
            Self::InvalidObject => write!(f, "invalid object"),
            Self::OtherFailure => write!(f, "other failure"),
        }
    }
}

impl From<TransferError> for Error {
    fn from(e: TransferError) -> Self {
        Self::Transfer(e)
    }
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Encoded frame would exceed the codec's transmit limit.
    FrameTooLong { len: usize, max: usize },
    /// Payload is not valid for this codec.
    InvalidPayload,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameTooLong { len, max } => write!(f, "frame length {len} exceeds {max}"),
            Self::InvalidPayload => write!(f, "invalid payload for codec"),
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
