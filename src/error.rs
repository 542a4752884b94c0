//! Error types for the adapter core.
//!
//! A small `thiserror`-derived enum per concern, rather than one catch-all
//! error type.

use thiserror::Error;

/// Errors surfaced across the NCI-core/NFC-service boundary.
///
/// Most failure kinds are handled internally by converging back to `IDLE`
/// and are never reported as `Err` at all — this type only covers the
/// handful of boundaries that explicitly surface an error to a caller
/// (transmit framing, transmit submission).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AdapterError {
    /// The frame-interface status byte was `RF_FRAME_CORRUPTED`.
    #[error("frame transmission corrupted (status 0x{0:02x})")]
    FramingError(u8),

    /// `send_data` on the NCI core collaborator returned no transmit id.
    #[error("lower layer rejected the send")]
    SendRejected,

    /// A transmit was canceled before it completed.
    #[error("transmit canceled")]
    Canceled,

    /// `transmit` was called while another transmit was already outstanding.
    #[error("a transmit is already in progress")]
    Busy,
}
