//! Transmit-side session state.

use crate::ConnectionId;
use crate::config::ConnectionConfig;
use crate::pdu::{FrameType, frames_needed};

/// Transmit state of a connection.
///
/// Each state owns the connection timer while it is current; entering a state always replaces
/// the timer with that state's own deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxState {
    /// No transfer active; the connection holds no slot.
    #[default]
    Idle,
    /// Waiting for the upper layer to stage at least one frame (`N_Cs`).
    WaitingForData,
    /// Frame credit available; one frame is copied and awaits confirmation (`N_As`).
    Sending,
    /// Honouring the receiver's separation time before the next frame.
    WaitingForSeparation,
    /// Block exhausted; waiting for the receiver's next flow-control frame (`N_Bs`).
    WaitingForFlowControl,
}

/// Description of a frame produced by [`crate::TxEngine::copy_data`].
///
/// The codec turns this into the PCI bytes in front of the copied payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxFrame {
    /// PCI layout to apply.
    pub frame_type: FrameType,
    /// Sequence number of a Consecutive frame.
    pub sequence_number: Option<u8>,
    /// Payload bytes copied into the frame buffer.
    pub len: usize,
    /// Total message length, encoded by Single and First frames.
    pub message_len: u32,
}

/// Progress indicator for [`crate::TxEngine::poll_send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// A frame was handed to the link.
    Sent(TxFrame),
    /// Waiting for a flow-control frame.
    WaitingForFlowControl,
    /// Nothing to send this cycle; retry later.
    WouldBlock,
    /// No transfer active on the connection.
    Idle,
}

/// Bookkeeping for the message held by one connection slot.
///
/// Only the event path touches these fields; the state and timer shared with the tick path live
/// next to it in the slot.
#[derive(Debug, Clone, Default)]
pub struct TxSession {
    /// Connection owning the slot.
    pub connection: ConnectionId,
    /// Configuration snapshot taken at admission.
    pub cfg: ConnectionConfig,
    /// Full message length.
    pub message_len: u32,
    /// Type of the next frame to copy.
    pub frame_type: FrameType,
    /// Bytes staged by the upper layer and not yet copied.
    pub available: u32,
    /// Bytes of the message not yet copied into a frame.
    pub remaining: u32,
    /// Sequence number for the next Consecutive frame.
    pub sequence_number: u8,
    /// Frames still permitted in the current block.
    pub frame_count: u8,
    /// Whether flow control still paces this message.
    pub cts_expected: bool,
    /// Ticks to wait between consecutive frames.
    pub separation_ticks: u16,
    /// Wait frames received since the last Clear-To-Send.
    pub wait_count: u8,
    /// A copied frame has not been confirmed yet.
    pub in_flight: bool,
}

impl TxSession {
    /// Fresh session for a newly admitted message.
    pub fn new(
        connection: ConnectionId,
        cfg: ConnectionConfig,
        message_len: u32,
        frame_type: FrameType,
    ) -> Self {
        Self {
            connection,
            cfg,
            message_len,
            frame_type,
            available: 0,
            remaining: message_len,
            sequence_number: 0,
            frame_count: 1,
            cts_expected: cfg.flow_control,
            separation_ticks: 0,
            wait_count: 0,
            in_flight: false,
        }
    }

    /// Payload size of the next frame.
    pub fn next_frame_len(&self) -> u32 {
        self.cfg
            .payload_capacity(self.frame_type)
            .min(self.remaining)
    }

    /// Whether the current block still permits a frame.
    ///
    /// Once flow control is disabled the block counter is never consulted again.
    pub fn has_credit(&self) -> bool {
        !self.cts_expected || self.frame_count > 0
    }

    /// Frames the staged bytes can fill right now.
    ///
    /// A short frame only counts when it carries the tail of the message; every other frame
    /// must be full. The result is clamped by the block credit while flow control is active.
    pub fn frames_ready(&self) -> u8 {
        let capacity = self.cfg.payload_capacity(self.frame_type);
        let staged = self.available.min(self.remaining);
        let frames = if staged == self.remaining {
            frames_needed(staged, capacity)
        } else if capacity == 0 {
            0
        } else {
            staged / capacity
        };
        let frames = if self.cts_expected {
            frames.min(u32::from(self.frame_count))
        } else {
            frames
        };
        u8::try_from(frames).unwrap_or(u8::MAX)
    }
}
