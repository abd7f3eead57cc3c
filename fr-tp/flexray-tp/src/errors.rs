//! Transport-layer error types.

use core::fmt;

/// Timeout category identifiers (ISO transport naming).
///
/// - `N_As` bounds the time between handing a frame to the link and its transmit confirmation.
/// - `N_Bs` bounds the time spent waiting for a flow-control frame.
/// - `N_Cs` bounds the time spent waiting for the upper layer to stage the next frame's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Transmit confirmation did not arrive.
    NAs,
    /// Flow control did not arrive.
    NBs,
    /// Upper-layer data did not become available.
    NCs,
}

/// Errors surfaced by the transmit engine.
///
/// Variants from [`FrTpError::Timeout`] to [`FrTpError::Cancelled`] terminate a transmission and
/// are delivered through [`crate::io::UpperLayer::tx_confirmation`]. The remaining variants are
/// returned synchronously by admission and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrTpError {
    /// Deadline exceeded for the indicated phase.
    Timeout(TimeoutKind),
    /// Receiver reported an overflow in a flow-control frame.
    Overflow,
    /// Flow-control frame carried a reserved flow status.
    InvalidFlowStatus,
    /// Receiver sent more Wait frames than the connection tolerates.
    WaitLimit,
    /// Upper layer failed to provide data.
    UpperLayer,
    /// Frame link refused a frame.
    LinkRejected,
    /// Caller aborted the transmission.
    Cancelled,
    /// A transmission is already active on this connection.
    NotIdle,
    /// No transmission is active on this connection.
    NotActive,
    /// Every connection slot is in use.
    NoFreeSlot,
    /// Connection identifier has no configuration.
    UnknownConnection,
    /// Connection configuration rejected.
    InvalidConfig,
    /// Message length is zero or not representable with the configured framing.
    InvalidLength,
    /// Transmission may only start with a Single or First frame.
    UnexpectedFrameType,
}

impl fmt::Display for FrTpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrTpError::Timeout(kind) => write!(f, "timeout ({kind:?})"),
            FrTpError::Overflow => f.write_str("receiver overflow"),
            FrTpError::InvalidFlowStatus => f.write_str("invalid flow status"),
            FrTpError::WaitLimit => f.write_str("too many wait frames"),
            FrTpError::UpperLayer => f.write_str("upper layer copy failed"),
            FrTpError::LinkRejected => f.write_str("frame rejected by link"),
            FrTpError::Cancelled => f.write_str("transmission cancelled"),
            FrTpError::NotIdle => f.write_str("connection busy"),
            FrTpError::NotActive => f.write_str("no active transmission"),
            FrTpError::NoFreeSlot => f.write_str("connection pool exhausted"),
            FrTpError::UnknownConnection => f.write_str("unknown connection"),
            FrTpError::InvalidConfig => f.write_str("invalid connection configuration"),
            FrTpError::InvalidLength => f.write_str("invalid message length"),
            FrTpError::UnexpectedFrameType => f.write_str("unexpected start frame type"),
        }
    }
}
