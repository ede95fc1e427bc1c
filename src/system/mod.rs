//! System utilities for embedded devices.
//!
//! Small platform collaborators the protocol layers are written against:
//!
//! - **[`timer`]**: a [`Clock`](timer::Clock) trait and the countdown
//!   [`Timer`](timer::Timer) used for every deadline in the MQTT engine
//! - **[`lock`]**: the [`Lock`](lock::Lock) abstraction and its try-once or
//!   blocking acquisition policy
//!
//! Both are `no_std` and allocation free.

/// Countdown timers over an abstract millisecond clock.
pub mod timer;

/// Locks guarding the client's state, TX and RX paths.
pub mod lock;
