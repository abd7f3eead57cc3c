//! Tick-driven countdown used for every per-connection timeout.

/// Countdown measured in scheduler ticks.
///
/// A countdown armed with `0` is disarmed: it never expires. A non-zero countdown expires exactly
/// once, on the tick that brings it to zero, and stays consumed until re-armed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Countdown(u16);

impl Countdown {
    /// Countdown that never fires.
    pub const DISARMED: Self = Self(0);

    /// Countdown firing after `ticks` ticks (`0` = disarmed).
    pub const fn armed(ticks: u16) -> Self {
        Self(ticks)
    }

    /// Ticks left before expiry.
    pub const fn remaining(self) -> u16 {
        self.0
    }

    /// Whether the countdown is still running.
    pub const fn is_running(self) -> bool {
        self.0 != 0
    }

    /// Advance by one tick; returns `true` on the tick that expires the countdown.
    pub fn tick(&mut self) -> bool {
        if self.0 == 0 {
            return false;
        }
        self.0 -= 1;
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_then_stays_consumed() {
        let mut t = Countdown::armed(2);
        assert!(!t.tick());
        assert!(t.tick());
        assert!(!t.is_running());
        assert!(!t.tick());
        assert!(!t.tick());
    }

    #[test]
    fn zero_never_fires() {
        let mut t = Countdown::armed(0);
        for _ in 0..4 {
            assert!(!t.tick());
        }
        assert_eq!(t, Countdown::DISARMED);
    }
}
