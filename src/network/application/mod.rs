//! # Application Layer Network Protocols
//!
//! Protocols that run on top of a [`Transport`](crate::network::Transport).
//!
//! ## Available Protocols
//!
//! - **[`mqtt`]**: MQTT 3.1.1 client engine with keep-alive and
//!   auto-reconnect, used directly or through the [`shadow`](crate::shadow)
//!   layer
//!
//! ## Design Principles
//!
//! - **Transport Agnostic**: the engine only sees the `Transport` trait
//! - **No-std Compatible**: fixed-size buffers, no heap allocation
//! - **Explicit Errors**: every failure is a typed error value

/// MQTT client implementation.
///
/// Provides an MQTT 3.1.1 client for lightweight publish-subscribe messaging,
/// commonly used in IoT applications.
pub mod mqtt;
