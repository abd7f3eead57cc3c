//! Per-connection static configuration and its lookup.

use core::time::Duration;

use heapless::LinearMap;

use crate::ConnectionId;
use crate::pdu::{FrameType, st_min_millis};

/// PCI sizes for one addressing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciSizes {
    /// PCI bytes of a Single or First frame.
    pub start: u8,
    /// PCI bytes of a Consecutive frame.
    pub consecutive: u8,
    /// Largest message length the start PCI can encode.
    pub max_message_len: u32,
}

impl PciSizes {
    /// Normal framing: 16-bit message length.
    pub const NORMAL: Self = Self {
        start: 4,
        consecutive: 2,
        max_message_len: u16::MAX as u32,
    };

    /// Extended framing: the start PCI carries a 32-bit message length.
    pub const EXTENDED: Self = Self {
        start: 6,
        consecutive: 2,
        max_message_len: u32::MAX,
    };

    /// PCI bytes for a frame of the given type.
    pub const fn for_frame(&self, frame_type: FrameType) -> u8 {
        match frame_type {
            FrameType::Single | FrameType::First => self.start,
            FrameType::Consecutive => self.consecutive,
        }
    }
}

/// Configuration for one logical transmit connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Frame payload size offered by the network layer, address and PCI included.
    pub payload_size: u8,
    /// Size of one address field; every frame carries source and target.
    pub address_size: u8,
    /// PCI layout of this connection.
    pub pci: PciSizes,
    /// Timeout waiting for transmit confirmation.
    pub n_as: Duration,
    /// Timeout waiting for flow control.
    pub n_bs: Duration,
    /// Timeout waiting for the upper layer to stage data.
    pub n_cs: Duration,
    /// Period of the scheduler calling [`crate::TxEngine::tick`].
    pub tick_period: Duration,
    /// Whether the receiver paces this connection with flow control.
    ///
    /// `false` starts every message unblocked, as after a Clear-To-Send with block size 0.
    pub flow_control: bool,
    /// Maximum number of consecutive Wait frames accepted (`None` = unlimited).
    pub wft_max: Option<u8>,
}

impl Default for ConnectionConfig {
    /// Classic 8-byte frames without address fields, 5 ms cycle and 1 s timeouts.
    fn default() -> Self {
        Self {
            payload_size: 8,
            address_size: 0,
            pci: PciSizes::NORMAL,
            n_as: Duration::from_millis(1000),
            n_bs: Duration::from_millis(1000),
            n_cs: Duration::from_millis(1000),
            tick_period: Duration::from_millis(5),
            flow_control: true,
            wft_max: None,
        }
    }
}

impl ConnectionConfig {
    /// Reject configurations that cannot carry payload or cannot be scheduled.
    ///
    /// Every timeout must fit the tick counter at the configured tick period.
    #[allow(clippy::result_unit_err)]
    pub fn validate(&self) -> Result<(), ()> {
        if self.tick_period.is_zero() || self.pci.max_message_len == 0 {
            return Err(());
        }
        for timeout in [self.n_as, self.n_bs, self.n_cs] {
            self.checked_ticks(timeout).ok_or(())?;
        }
        if self.payload_capacity(FrameType::First) == 0
            || self.payload_capacity(FrameType::Consecutive) == 0
        {
            return Err(());
        }
        Ok(())
    }

    /// Application bytes a frame of the given type can carry.
    pub fn payload_capacity(&self, frame_type: FrameType) -> u32 {
        let overhead = 2 * u32::from(self.address_size) + u32::from(self.pci.for_frame(frame_type));
        u32::from(self.payload_size).saturating_sub(overhead)
    }

    /// Whole ticks covering `duration`, rounded up; a zero duration yields 0 (no timeout).
    ///
    /// Saturates at `u16::MAX`; [`ConnectionConfig::validate`] rejects timeouts that would.
    pub fn ticks(&self, duration: Duration) -> u16 {
        self.checked_ticks(duration).unwrap_or(u16::MAX)
    }

    /// [`ConnectionConfig::ticks`], or `None` when `duration` does not fit the tick counter.
    pub fn checked_ticks(&self, duration: Duration) -> Option<u16> {
        let period = self.tick_period.as_micros();
        if period == 0 || duration.is_zero() {
            return Some(0);
        }
        u16::try_from(duration.as_micros().div_ceil(period)).ok()
    }

    /// Ticks to leave between consecutive frames for a receiver-advertised STmin byte.
    ///
    /// Only millisecond encodings at or above one scheduling period cost ticks; shorter ones are
    /// already guaranteed by the scheduler cycle, and microsecond or reserved encodings give 0.
    pub fn separation_ticks(&self, st_min: u8) -> u16 {
        match st_min_millis(st_min) {
            Some(st_min) if st_min >= self.tick_period => self.ticks(st_min),
            _ => 0,
        }
    }
}

/// Read-only provider of connection configuration.
pub trait ConfigLookup {
    /// Configuration of `connection`, if known.
    fn connection(&self, connection: ConnectionId) -> Option<&ConnectionConfig>;
}

impl<const K: usize> ConfigLookup for [(ConnectionId, ConnectionConfig); K] {
    fn connection(&self, connection: ConnectionId) -> Option<&ConnectionConfig> {
        self.iter()
            .find(|(id, _)| *id == connection)
            .map(|(_, cfg)| cfg)
    }
}

impl<const K: usize> ConfigLookup for LinearMap<ConnectionId, ConnectionConfig, K> {
    fn connection(&self, connection: ConnectionId) -> Option<&ConnectionConfig> {
        self.get(&connection)
    }
}
