//! # libshadow - embedded MQTT and device shadow SDK
//!
//! An MQTT 3.1.1 client and a device shadow layer for constrained IoT devices.
//! The crate keeps a reconnecting session with a cloud broker and keeps a
//! device's JSON state document consistent with its cloud-side copy. It is
//! `no_std`, allocation free and runs on a single thread of control driven by
//! explicit calls.
//!
//! ## Features
//!
//! ### MQTT Client
//! - CONNECT/PUBLISH/SUBSCRIBE/UNSUBSCRIBE/DISCONNECT with QoS 0 and 1
//! - Bounded subscription table with `+`/`#` topic filters
//! - Keep-alive pings and auto-reconnect with exponential back-off
//! - Will message and username/password authentication
//!
//! ### Device Shadow
//! - Get, update and delete requests correlated with their responses by client token
//! - Reference-counted accepted/rejected subscriptions with optional stickiness
//! - Delta dispatch to typed fields with old-version discarding
//! - Update document builder
//!
//! ### Collaborators
//! - [`network::Transport`]: the byte stream to the broker (TCP, TLS, modem...)
//! - [`system::timer::Clock`]: a millisecond clock
//! - [`system::lock::Lock`]: locks for sharing a client between contexts
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! libshadow = "0.1.0"
//! ```
//!
//! ### MQTT Client Example
//!
//! ```rust,no_run
//! use libshadow::network::application::mqtt::{Client, InitParams, Message, Options, QoS};
//! # use libshadow::network::{Transport, TransportError};
//! # use libshadow::system::timer::Clock;
//! # struct MockTransport;
//! # impl Transport for MockTransport {
//! #     fn connect(&mut self) -> Result<(), TransportError> { Ok(()) }
//! #     fn read(&mut self, _buf: &mut [u8], _timeout_ms: u32) -> Result<usize, TransportError> { Ok(0) }
//! #     fn write(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<usize, TransportError> { Ok(buf.len()) }
//! #     fn disconnect(&mut self) -> Result<(), TransportError> { Ok(()) }
//! #     fn is_connected(&mut self) -> bool { true }
//! #     fn destroy(&mut self) -> Result<(), TransportError> { Ok(()) }
//! # }
//! # struct MockClock;
//! # impl Clock for MockClock { fn now_ms(&self) -> u64 { 0 } }
//! # fn main() -> Result<(), libshadow::network::application::mqtt::Error> {
//! let handler = |topic: &str, message: &Message<'_>| {
//!     let _ = (topic, message.payload);
//! };
//!
//! let mut client: Client<'_, _, _> = Client::new(MockTransport, MockClock, InitParams::default())?;
//! client.connect(Some(Options::new("my_device")))?;
//! client.subscribe("sensors/+/config", QoS::AtLeastOnce, &handler)?;
//! client.publish("sensors/temperature", b"23.5", QoS::AtMostOnce, false)?;
//! client.yield_for(100)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Shadow Example
//!
//! ```rust,no_run
//! use libshadow::shadow::{ConnectParams, InitParams, Shadow};
//! # use libshadow::network::{Transport, TransportError};
//! # use libshadow::system::timer::Clock;
//! # struct MockTransport;
//! # impl Transport for MockTransport {
//! #     fn connect(&mut self) -> Result<(), TransportError> { Ok(()) }
//! #     fn read(&mut self, _buf: &mut [u8], _timeout_ms: u32) -> Result<usize, TransportError> { Ok(0) }
//! #     fn write(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<usize, TransportError> { Ok(buf.len()) }
//! #     fn disconnect(&mut self) -> Result<(), TransportError> { Ok(()) }
//! #     fn is_connected(&mut self) -> bool { true }
//! #     fn destroy(&mut self) -> Result<(), TransportError> { Ok(()) }
//! # }
//! # struct MockClock;
//! # impl Clock for MockClock { fn now_ms(&self) -> u64 { 0 } }
//! # fn main() -> Result<(), libshadow::shadow::Error> {
//! let mut shadow: Shadow<'_, _, _> = Shadow::new(MockTransport, MockClock, InitParams::default())?;
//! shadow.connect(ConnectParams::new("thermostat", "thermostat-1"))?;
//! shadow.get("thermostat", None, 5, false)?;
//! shadow.yield_for(200)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.)
//! - Linux-based IoT devices (Raspberry Pi, etc.)
//! - Any platform supporting Rust's `core` library
//!
//! ## Optional Features
//!
//! - `std`: Enable the blocking TCP transport and the `Instant` based clock (default: disabled)
//! - `defmt`: Enable defmt formatting of errors and states for embedded debugging

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![doc(html_root_url = "https://shishir-dey.github.io/libshadow/")]

/// Network abstraction layer and the MQTT protocol implementation.
///
/// Contains the [`Transport`](network::Transport) trait the client is written
/// against and the MQTT client itself under `network::application::mqtt`.
pub mod network;

/// System utilities for embedded devices.
///
/// Timers and locks the protocol layers depend on.
pub mod system;

/// Span-based JSON tokenizer and typed value parsing.
pub mod json;

/// Device shadow synchronization on top of the MQTT client.
pub mod shadow;
