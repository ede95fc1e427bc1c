//! Millisecond countdown timers over an abstract clock.

/// A monotonic millisecond clock.
///
/// Implementations only need to be monotonic; the epoch is arbitrary.
pub trait Clock {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;

    /// Block the caller for `ms` milliseconds.
    ///
    /// The default spins on [`now_ms`](Clock::now_ms). Clocks that can sleep
    /// or yield to a scheduler should override it.
    fn delay_ms(&self, ms: u32) {
        let timer = Timer::after_ms(self, ms);
        while !timer.has_expired(self) {
            core::hint::spin_loop();
        }
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn delay_ms(&self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

/// A countdown deadline.
///
/// A freshly created timer is already expired, matching the behaviour the
/// engine relies on for the ping and reconnect timers before first use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timer {
    deadline_ms: u64,
}

impl Timer {
    /// An expired timer.
    pub const fn new() -> Self {
        Self { deadline_ms: 0 }
    }

    /// A timer that expires `ms` milliseconds from now.
    pub fn after_ms<C: Clock + ?Sized>(clock: &C, ms: u32) -> Self {
        let mut timer = Self::new();
        timer.countdown_ms(clock, ms);
        timer
    }

    /// Re-arm to expire `ms` milliseconds from now.
    pub fn countdown_ms<C: Clock + ?Sized>(&mut self, clock: &C, ms: u32) {
        self.deadline_ms = clock.now_ms().saturating_add(u64::from(ms));
    }

    /// Re-arm to expire `secs` seconds from now.
    pub fn countdown_sec<C: Clock + ?Sized>(&mut self, clock: &C, secs: u32) {
        self.deadline_ms = clock
            .now_ms()
            .saturating_add(u64::from(secs).saturating_mul(1000));
    }

    /// Whether the deadline has passed.
    pub fn has_expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        clock.now_ms() >= self.deadline_ms
    }

    /// Milliseconds left before expiry, saturating at zero.
    pub fn left_ms<C: Clock + ?Sized>(&self, clock: &C) -> u32 {
        let left = self.deadline_ms.saturating_sub(clock.now_ms());
        u32::try_from(left).unwrap_or(u32::MAX)
    }
}

/// A [`Clock`] backed by [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Start a clock at the current instant.
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn delay_ms(&self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
