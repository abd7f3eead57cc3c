//! Frame-level vocabulary shared by the transmit engine and its codec.
//!
//! The PCI byte layout itself belongs to the codec; this module only carries what the state
//! machine needs to size frames and interpret flow control.

use core::time::Duration;

/// Kind of data frame, selecting the PCI layout the codec applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameType {
    /// Whole message in one frame.
    #[default]
    Single,
    /// Opening frame of a segmented message, carrying the total length.
    First,
    /// Follow-up frame carrying a sequence number.
    Consecutive,
}

/// Flow status carried by a flow-control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Clear to send more consecutive frames.
    ClearToSend,
    /// Wait before resuming.
    Wait,
    /// Abort due to overflow.
    Overflow,
}

impl FlowStatus {
    /// Decode the low PCI nibble of a flow-control frame; reserved values yield `None`.
    pub fn from_nibble(raw: u8) -> Option<Self> {
        match raw & 0x0F {
            0x0 => Some(FlowStatus::ClearToSend),
            0x1 => Some(FlowStatus::Wait),
            0x2 => Some(FlowStatus::Overflow),
            _ => None,
        }
    }
}

/// Largest STmin byte in the millisecond range.
pub const ST_MIN_MAX_MILLIS: u8 = 0x7F;

/// Separation time carried by an STmin byte in the millisecond range.
///
/// The microsecond range (`0xF1..=0xF9`) and the reserved encodings yield `None`: they impose no
/// wait beyond the scheduler cycle.
pub fn st_min_millis(raw: u8) -> Option<Duration> {
    (raw <= ST_MIN_MAX_MILLIS).then(|| Duration::from_millis(u64::from(raw)))
}

/// Sequence number following `sn` in the 4-bit field.
pub const fn next_sequence_number(sn: u8) -> u8 {
    sn.wrapping_add(1) & 0x0F
}

/// Frames needed to carry `bytes` at `capacity` bytes per frame, without floating point.
pub const fn frames_needed(bytes: u32, capacity: u32) -> u32 {
    if capacity == 0 {
        return 0;
    }
    bytes / capacity + (bytes % capacity != 0) as u32
}
