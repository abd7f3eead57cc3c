//! `flexray-tp`: the transmit side of a segmented transport protocol for FlexRay-style networks.
//!
//! Large application messages are carried over fixed-size frames by splitting them into:
//! - a **Single Frame** when the whole message fits one frame, or
//! - a **First Frame** followed by **Consecutive Frames**, paced by the receiver's
//!   **Flow Control** frames (Clear-To-Send with block size and separation time, Wait, Overflow).
//!
//! This crate provides [`TxEngine`], a per-connection transmit state machine driven entirely by
//! run-to-completion calls:
//! - the upper layer requests a transfer with [`TxEngine::transmit`],
//! - the frame scheduler asks [`TxEngine::is_data_pending`] each cycle and pulls frames through
//!   [`TxEngine::copy_data`] (or lets [`TxEngine::poll_send`] do both and hand the frame to the
//!   [`FrameLink`]),
//! - the network layer reports [`TxEngine::tx_confirmation`] and decoded flow-control frames,
//! - a periodic scheduler advances timeouts, either with [`TxEngine::tick_all`] or by ticking the
//!   shared [`SlotTimers`] and letting [`TxEngine::process_timeouts`] handle what expired.
//!
//! The crate is `no_std` and allocation-free: connection slots come from a fixed pool of `N`
//! entries, and a connection that is not transmitting holds no slot.
//!
//! # Concurrency
//! The state and timer of every slot live in a [`SlotTimers`] borrowed by the engine. Each pair sits
//! behind an `embassy-sync` blocking mutex, parameterised by the `RawMutex` chosen by the integrator
//! (`CriticalSectionRawMutex` when ticking from interrupt context, `NoopRawMutex` for
//! single-context use). [`SlotTimers::tick`] takes `&self`, so the tick context never needs the
//! engine; it only flags expired timers, and the event context handles them in
//! [`TxEngine::process_timeouts`]. Every other per-slot field is touched only by the event path.
//! Callers must still serialise events for one connection.
//!
//! # Quick start
//! ```rust,ignore
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use flexray_tp::{ConnectionConfig, FrameType, Progress, SlotTimers, TxEngine};
//!
//! static TIMERS: SlotTimers<CriticalSectionRawMutex, 4> = SlotTimers::new();
//!
//! // Cycle interrupt:
//! fn on_cycle() {
//!     TIMERS.tick();
//! }
//!
//! let table = [(0x10, ConnectionConfig::default())];
//! let mut engine = TxEngine::new(table, upper_layer, frame_link, &TIMERS);
//!
//! engine.transmit(0x10, 300, FrameType::First)?;
//! let mut frame = [0u8; 254];
//! loop {
//!     engine.process_timeouts();
//!     if let Progress::Idle = engine.poll_send(0x10, &mut frame) {
//!         break;
//!     }
//! }
//! ```

#![no_std]

pub mod config;
pub mod errors;
pub mod io;
pub mod pdu;
pub mod registry;
pub mod timer;
pub mod tx;

pub use config::{ConfigLookup, ConnectionConfig, PciSizes};
pub use errors::{FrTpError, TimeoutKind};
pub use io::{BufReq, FrameLink, UpperLayer};
pub use pdu::{FlowStatus, FrameType};
pub use registry::{Registry, SlotTimers};
pub use timer::Countdown;
pub use tx::{Progress, TxFrame, TxSession, TxState};

use embassy_sync::blocking_mutex::raw::RawMutex;
use log::{debug, warn};

use pdu::next_sequence_number;

/// Logical connection identifier.
pub type ConnectionId = u16;

/// Transmit engine serving up to `N` concurrent connections.
pub struct TxEngine<'t, M, P, U, L, const N: usize>
where
    M: RawMutex,
    P: ConfigLookup,
    U: UpperLayer,
    L: FrameLink,
{
    config: P,
    upper: U,
    link: L,
    registry: Registry<'t, M, N>,
}

impl<'t, M, P, U, L, const N: usize> TxEngine<'t, M, P, U, L, N>
where
    M: RawMutex,
    P: ConfigLookup,
    U: UpperLayer,
    L: FrameLink,
{
    /// Create an engine with every connection idle.
    ///
    /// `timers` must not be shared with another engine; the tick context may keep its own
    /// reference to it.
    pub fn new(config: P, upper: U, link: L, timers: &'t SlotTimers<M, N>) -> Self {
        Self {
            config,
            upper,
            link,
            registry: Registry::new(timers),
        }
    }

    /// Slot timers shared with the tick context.
    pub fn timers(&self) -> &'t SlotTimers<M, N> {
        self.registry.timers()
    }

    /// Configuration provider.
    pub fn config(&self) -> &P {
        &self.config
    }

    /// Upper layer collaborator.
    pub fn upper(&self) -> &U {
        &self.upper
    }

    /// Mutable access to the upper layer collaborator.
    pub fn upper_mut(&mut self) -> &mut U {
        &mut self.upper
    }

    /// Frame link collaborator.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Mutable access to the frame link collaborator.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Current state of `connection` (`Idle` when it holds no slot).
    pub fn state(&self, connection: ConnectionId) -> TxState {
        self.registry
            .lookup(connection)
            .map(|idx| self.registry.state(idx))
            .unwrap_or(TxState::Idle)
    }

    /// Session of an active `connection`.
    pub fn session(&self, connection: ConnectionId) -> Option<&TxSession> {
        self.registry
            .lookup(connection)
            .map(|idx| self.registry.session(idx))
    }

    /// Number of connections holding a slot.
    pub fn active_connections(&self) -> usize {
        self.registry.active()
    }

    /// Admit a message of `message_len` bytes on `connection`.
    ///
    /// `frame_type` is [`FrameType::Single`] when the message fits one frame and
    /// [`FrameType::First`] otherwise. Nothing is sent yet: the connection waits for the upper
    /// layer to stage data.
    pub fn transmit(
        &mut self,
        connection: ConnectionId,
        message_len: u32,
        frame_type: FrameType,
    ) -> Result<(), FrTpError> {
        if frame_type == FrameType::Consecutive {
            return Err(FrTpError::UnexpectedFrameType);
        }
        let cfg = *self
            .config
            .connection(connection)
            .ok_or(FrTpError::UnknownConnection)?;
        cfg.validate().map_err(|_| FrTpError::InvalidConfig)?;
        if message_len == 0
            || message_len > cfg.pci.max_message_len
            || (frame_type == FrameType::Single
                && message_len > cfg.payload_capacity(FrameType::Single))
        {
            return Err(FrTpError::InvalidLength);
        }

        let session = TxSession::new(connection, cfg, message_len, frame_type);
        let idx = self.registry.allocate(session)?;
        self.registry
            .enter(idx, TxState::WaitingForData, cfg.ticks(cfg.n_cs));
        debug!("fr-tp: connection {connection} admitted {message_len} bytes ({frame_type:?})");
        Ok(())
    }

    /// Abort the transfer on `connection`; the upper layer is notified with
    /// [`FrTpError::Cancelled`].
    ///
    /// A frame that was copied but not yet confirmed is withdrawn from the link.
    pub fn cancel_transmit(&mut self, connection: ConnectionId) -> Result<(), FrTpError> {
        let idx = self
            .registry
            .lookup(connection)
            .ok_or(FrTpError::NotActive)?;
        if self.registry.session(idx).in_flight {
            self.link.cancel_transmit(connection);
        }
        self.abort(idx, FrTpError::Cancelled);
        Ok(())
    }

    /// Number of frames `connection` can fill right now.
    ///
    /// While waiting for data this polls the upper layer for its staged byte count and moves to
    /// `Sending` once at least one frame can be filled.
    pub fn is_data_pending(&mut self, connection: ConnectionId) -> u8 {
        let Some(idx) = self.registry.lookup(connection) else {
            return 0;
        };
        match self.registry.state(idx) {
            TxState::WaitingForData => self.poll_data(idx),
            TxState::Sending => {
                let session = self.registry.session(idx);
                if session.in_flight {
                    0
                } else {
                    session.frames_ready()
                }
            }
            _ => 0,
        }
    }

    /// Copy the next frame's payload into `dest`.
    ///
    /// Returns the frame description when a frame is ready to send. `None` means nothing was
    /// copied: no frame is due, `dest` is too small, the upper layer is busy, or the upper layer
    /// failed (which aborts the transfer).
    pub fn copy_data(&mut self, connection: ConnectionId, dest: &mut [u8]) -> Option<TxFrame> {
        let idx = self.registry.lookup(connection)?;
        let session = self.registry.session(idx);
        if self.registry.state(idx) != TxState::Sending
            || session.in_flight
            || !session.has_credit()
        {
            return None;
        }
        let len = session.next_frame_len() as usize;
        if len > dest.len() {
            warn!(
                "fr-tp: connection {connection} frame of {len} bytes exceeds buffer of {}",
                dest.len()
            );
            return None;
        }

        match self.upper.copy_tx_data(connection, &mut dest[..len]) {
            BufReq::Ok(available) => {
                let session = self.registry.session_mut(idx);
                let frame_type = session.frame_type;
                let sequence_number = (frame_type == FrameType::Consecutive).then(|| {
                    let sn = session.sequence_number;
                    session.sequence_number = next_sequence_number(sn);
                    sn
                });
                session.frame_type = FrameType::Consecutive;
                session.available = available;
                session.remaining -= len as u32;
                if session.cts_expected {
                    session.frame_count = session.frame_count.saturating_sub(1);
                }
                session.in_flight = true;
                Some(TxFrame {
                    frame_type,
                    sequence_number,
                    len,
                    message_len: session.message_len,
                })
            }
            BufReq::Busy => None,
            BufReq::NotOk => {
                self.abort(idx, FrTpError::UpperLayer);
                None
            }
        }
    }

    /// Scheduler step: copy the next due frame into `buf` and hand it to the link.
    ///
    /// A frame refused by the link aborts the transfer with [`FrTpError::LinkRejected`].
    pub fn poll_send(&mut self, connection: ConnectionId, buf: &mut [u8]) -> Progress {
        if self.is_data_pending(connection) == 0 {
            return self.idle_progress(connection);
        }
        let Some(frame) = self.copy_data(connection, buf) else {
            return self.idle_progress(connection);
        };
        match self.link.transmit(connection, &frame, &buf[..frame.len]) {
            Ok(()) => Progress::Sent(frame),
            Err(_) => {
                if let Some(idx) = self.registry.lookup(connection) {
                    self.abort(idx, FrTpError::LinkRejected);
                }
                Progress::Idle
            }
        }
    }

    /// Network layer confirmed the frame copied last.
    pub fn tx_confirmation(&mut self, connection: ConnectionId) {
        let Some(idx) = self.registry.lookup(connection) else {
            return;
        };
        if self.registry.state(idx) != TxState::Sending || !self.registry.session(idx).in_flight {
            return;
        }
        let session = self.registry.session_mut(idx);
        session.in_flight = false;

        if session.remaining == 0 {
            self.finish(idx);
        } else if session.has_credit() {
            self.enter_separation(idx);
        } else {
            let cfg = session.cfg;
            self.registry
                .enter(idx, TxState::WaitingForFlowControl, cfg.ticks(cfg.n_bs));
            debug!("fr-tp: connection {connection} block complete, waiting for flow control");
        }
    }

    /// Dispatch a decoded flow-control frame by its raw flow-status nibble.
    pub fn received_flow_control(
        &mut self,
        connection: ConnectionId,
        status: u8,
        block_size: u8,
        st_min: u8,
    ) {
        match FlowStatus::from_nibble(status) {
            Some(FlowStatus::ClearToSend) => {
                self.received_clear_to_send(connection, block_size, st_min)
            }
            Some(FlowStatus::Wait) => self.received_wait(connection),
            Some(FlowStatus::Overflow) => self.received_overflow(connection),
            None => self.received_invalid_flow_status(connection),
        }
    }

    /// Receiver granted `block_size` more frames (`0` = no further flow control for this
    /// message), at least `st_min` (STmin byte encoding) apart.
    pub fn received_clear_to_send(&mut self, connection: ConnectionId, block_size: u8, st_min: u8) {
        let Some(idx) = self.waiting_for_flow_control(connection) else {
            return;
        };
        let session = self.registry.session_mut(idx);
        session.wait_count = 0;
        if block_size == 0 {
            session.cts_expected = false;
        } else {
            session.frame_count = block_size;
        }
        session.separation_ticks = session.cfg.separation_ticks(st_min);
        let separation_ticks = session.separation_ticks;
        let cfg = session.cfg;
        self.registry
            .enter(idx, TxState::WaitingForData, cfg.ticks(cfg.n_cs));
        debug!(
            "fr-tp: connection {connection} CTS bs={block_size} stmin={st_min:#04x} ({separation_ticks} ticks)"
        );
    }

    /// Receiver asked to wait; the flow-control timeout restarts.
    pub fn received_wait(&mut self, connection: ConnectionId) {
        let Some(idx) = self.waiting_for_flow_control(connection) else {
            return;
        };
        let session = self.registry.session_mut(idx);
        session.wait_count = session.wait_count.saturating_add(1);
        let exceeded = session
            .cfg
            .wft_max
            .is_some_and(|max| session.wait_count > max);
        if exceeded {
            self.abort(idx, FrTpError::WaitLimit);
            return;
        }
        let cfg = self.registry.session(idx).cfg;
        self.registry
            .enter(idx, TxState::WaitingForFlowControl, cfg.ticks(cfg.n_bs));
    }

    /// Receiver cannot take the message.
    pub fn received_overflow(&mut self, connection: ConnectionId) {
        if let Some(idx) = self.waiting_for_flow_control(connection) {
            self.abort(idx, FrTpError::Overflow);
        }
    }

    /// Flow-control frame with a reserved flow status.
    pub fn received_invalid_flow_status(&mut self, connection: ConnectionId) {
        if let Some(idx) = self.waiting_for_flow_control(connection) {
            self.abort(idx, FrTpError::InvalidFlowStatus);
        }
    }

    /// Advance the timer of `connection` by one scheduling period and handle its expiry.
    pub fn tick(&mut self, connection: ConnectionId) {
        let Some(idx) = self.registry.lookup(connection) else {
            return;
        };
        self.registry.timers().tick_slot(idx);
        self.handle_expiry(idx);
    }

    /// Advance every slot timer by one scheduling period and handle what expired.
    ///
    /// Single-context shorthand for [`SlotTimers::tick`] followed by
    /// [`TxEngine::process_timeouts`].
    pub fn tick_all(&mut self) {
        self.registry.timers().tick();
        self.process_timeouts();
    }

    /// Handle every timer the tick context flagged as expired.
    pub fn process_timeouts(&mut self) {
        let active: heapless::Vec<ConnectionId, N> = self.registry.connections().collect();
        for connection in active {
            if let Some(idx) = self.registry.lookup(connection) {
                self.handle_expiry(idx);
            }
        }
    }

    /// Return every connection to idle without notifying the upper layer.
    pub fn stop_all(&mut self) {
        let active: heapless::Vec<ConnectionId, N> = self.registry.connections().collect();
        for connection in active {
            if let Some(idx) = self.registry.lookup(connection) {
                self.registry.release(idx);
            }
        }
    }

    fn poll_data(&mut self, idx: usize) -> u8 {
        let connection = self.registry.session(idx).connection;
        match self.upper.copy_tx_data(connection, &mut []) {
            BufReq::Ok(available) => {
                let session = self.registry.session_mut(idx);
                session.available = available;
                let frames = session.frames_ready();
                if frames > 0 {
                    let cfg = session.cfg;
                    self.registry
                        .enter(idx, TxState::Sending, cfg.ticks(cfg.n_as));
                }
                frames
            }
            BufReq::Busy => 0,
            BufReq::NotOk => {
                self.abort(idx, FrTpError::UpperLayer);
                0
            }
        }
    }

    fn handle_expiry(&mut self, idx: usize) {
        if let Some(state) = self.registry.timers().take_expired(idx) {
            self.on_timeout(idx, state);
        }
    }

    fn on_timeout(&mut self, idx: usize, state: TxState) {
        let connection = self.registry.session(idx).connection;
        match state {
            TxState::Idle => {}
            TxState::WaitingForSeparation => {
                let cfg = self.registry.session(idx).cfg;
                self.registry
                    .enter(idx, TxState::WaitingForData, cfg.ticks(cfg.n_cs));
            }
            TxState::Sending => {
                if self.registry.session(idx).in_flight {
                    self.link.cancel_transmit(connection);
                }
                self.abort(idx, FrTpError::Timeout(TimeoutKind::NAs));
            }
            TxState::WaitingForData => self.abort(idx, FrTpError::Timeout(TimeoutKind::NCs)),
            TxState::WaitingForFlowControl => {
                self.abort(idx, FrTpError::Timeout(TimeoutKind::NBs))
            }
        }
    }

    fn enter_separation(&mut self, idx: usize) {
        let session = self.registry.session(idx);
        let cfg = session.cfg;
        match session.separation_ticks {
            0 => self
                .registry
                .enter(idx, TxState::WaitingForData, cfg.ticks(cfg.n_cs)),
            ticks => self
                .registry
                .enter(idx, TxState::WaitingForSeparation, ticks),
        }
    }

    fn waiting_for_flow_control(&self, connection: ConnectionId) -> Option<usize> {
        self.registry
            .lookup(connection)
            .filter(|&idx| self.registry.state(idx) == TxState::WaitingForFlowControl)
    }

    fn idle_progress(&self, connection: ConnectionId) -> Progress {
        match self.state(connection) {
            TxState::Idle => Progress::Idle,
            TxState::WaitingForFlowControl => Progress::WaitingForFlowControl,
            _ => Progress::WouldBlock,
        }
    }

    fn finish(&mut self, idx: usize) {
        let connection = self.registry.session(idx).connection;
        debug!("fr-tp: connection {connection} complete");
        self.registry.release(idx);
        self.upper.tx_confirmation(connection, Ok(()));
    }

    fn abort(&mut self, idx: usize, error: FrTpError) {
        let connection = self.registry.session(idx).connection;
        warn!("fr-tp: connection {connection} aborted: {error}");
        self.registry.release(idx);
        self.upper.tx_confirmation(connection, Err(error));
    }
}
