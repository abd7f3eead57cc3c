//! Bounded pool of connection slots and the connection-to-slot map.
//!
//! A slot is split in two: the state and timer the periodic tick touches live in [`SlotTimers`],
//! each pair behind its own blocking mutex, while the [`TxSession`] bookkeeping stays with the
//! event path in [`Registry`].

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::LinearMap;

use crate::ConnectionId;
use crate::errors::FrTpError;
use crate::timer::Countdown;
use crate::tx::{TxSession, TxState};

/// The fields the tick path shares with the event path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Shared {
    state: TxState,
    timer: Countdown,
    /// Timer ran out; the timeout is not handled yet.
    expired: bool,
}

impl Shared {
    const IDLE: Self = Self {
        state: TxState::Idle,
        timer: Countdown::DISARMED,
        expired: false,
    };
}

/// State and timer of every slot.
///
/// Ticking only needs `&self`, so a `static` instance can be ticked from interrupt context
/// (with `CriticalSectionRawMutex`) while the engine borrowing it handles events from a task.
/// Expired timers are flagged here and handled later by the engine.
pub struct SlotTimers<M: RawMutex, const N: usize> {
    cells: [Mutex<M, Cell<Shared>>; N],
}

impl<M: RawMutex, const N: usize> Default for SlotTimers<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const N: usize> SlotTimers<M, N> {
    /// Every slot idle with its timer disarmed.
    pub const fn new() -> Self {
        Self {
            cells: [const { Mutex::new(Cell::new(Shared::IDLE)) }; N],
        }
    }

    /// Current state of `slot`.
    pub fn state(&self, slot: usize) -> TxState {
        self.cells[slot].lock(|s| s.get().state)
    }

    /// Ticks left on the timer of `slot`.
    pub fn timer(&self, slot: usize) -> Countdown {
        self.cells[slot].lock(|s| s.get().timer)
    }

    /// Whether `slot` has an expired timer waiting to be handled.
    pub fn is_expired(&self, slot: usize) -> bool {
        self.cells[slot].lock(|s| s.get().expired)
    }

    /// Advance the timer of `slot` by one tick; returns `true` when it expires on this tick.
    pub fn tick_slot(&self, slot: usize) -> bool {
        self.cells[slot].lock(|s| {
            let mut shared = s.get();
            let expired = shared.timer.tick();
            shared.expired |= expired;
            s.set(shared);
            expired
        })
    }

    /// Advance every timer by one tick; returns `true` when at least one expired.
    ///
    /// Idle slots hold a disarmed timer and are unaffected.
    pub fn tick(&self) -> bool {
        (0..N).fold(false, |any, slot| self.tick_slot(slot) | any)
    }

    /// Switch `slot` to `state`, replacing the previous timer and dropping an unhandled expiry.
    pub(crate) fn enter(&self, slot: usize, state: TxState, ticks: u16) {
        self.cells[slot].lock(|s| {
            s.set(Shared {
                state,
                timer: Countdown::armed(ticks),
                expired: false,
            })
        });
    }

    /// Consume the expiry flag of `slot`, returning the state whose timer ran out.
    pub(crate) fn take_expired(&self, slot: usize) -> Option<TxState> {
        self.cells[slot].lock(|s| {
            let mut shared = s.get();
            if !shared.expired {
                return None;
            }
            shared.expired = false;
            s.set(shared);
            Some(shared.state)
        })
    }
}

/// Arena of `N` sessions addressed by slot index, plus the map from connection to slot.
///
/// A connection without an entry is implicitly idle.
pub struct Registry<'t, M: RawMutex, const N: usize> {
    timers: &'t SlotTimers<M, N>,
    sessions: [TxSession; N],
    index: LinearMap<ConnectionId, usize, N>,
}

impl<'t, M: RawMutex, const N: usize> Registry<'t, M, N> {
    /// Pool with every slot free, sharing `timers` with the tick context.
    pub fn new(timers: &'t SlotTimers<M, N>) -> Self {
        Self {
            timers,
            sessions: core::array::from_fn(|_| TxSession::default()),
            index: LinearMap::new(),
        }
    }

    /// Timers of this pool.
    pub fn timers(&self) -> &'t SlotTimers<M, N> {
        self.timers
    }

    /// Claim a free slot for `session.connection`.
    pub fn allocate(&mut self, session: TxSession) -> Result<usize, FrTpError> {
        let connection = session.connection;
        if self.index.contains_key(&connection) {
            return Err(FrTpError::NotIdle);
        }
        let idx = (0..N)
            .find(|idx| !self.index.values().any(|used| used == idx))
            .ok_or(FrTpError::NoFreeSlot)?;
        self.index
            .insert(connection, idx)
            .map_err(|_| FrTpError::NoFreeSlot)?;
        self.sessions[idx] = session;
        Ok(idx)
    }

    /// Slot held by `connection`, if any.
    pub fn lookup(&self, connection: ConnectionId) -> Option<usize> {
        self.index.get(&connection).copied()
    }

    /// Session in slot `idx`.
    pub fn session(&self, idx: usize) -> &TxSession {
        &self.sessions[idx]
    }

    /// Mutable session in slot `idx`.
    pub fn session_mut(&mut self, idx: usize) -> &mut TxSession {
        &mut self.sessions[idx]
    }

    /// Current state of slot `idx`.
    pub fn state(&self, idx: usize) -> TxState {
        self.timers.state(idx)
    }

    /// Switch slot `idx` to `state` with a fresh timer of `ticks`.
    pub fn enter(&self, idx: usize, state: TxState, ticks: u16) {
        self.timers.enter(idx, state, ticks);
    }

    /// Return the slot to the pool; the connection becomes idle.
    pub fn release(&mut self, idx: usize) {
        self.timers.enter(idx, TxState::Idle, 0);
        let connection = self.sessions[idx].connection;
        self.sessions[idx] = TxSession::default();
        self.index.remove(&connection);
    }

    /// Number of slots in use.
    pub fn active(&self) -> usize {
        self.index.len()
    }

    /// Connections currently holding a slot.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.index.keys().copied()
    }
}
