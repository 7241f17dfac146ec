//! # libmqtt - Embedded MQTT 3.1.1 Client
//!
//! A lightweight MQTT 3.1.1 client for embedded systems and `no_std`
//! environments. It builds and parses MQTT control packets over any reliable
//! byte stream, drives a connect/subscribe/publish state machine, and
//! delivers QoS 0/1/2 semantics with fixed-size buffers and no allocation.
//!
//! ## Features
//!
//! - MQTT 3.1.1 protocol compliance (protocol name `"MQTT"`, level 4)
//! - Quality of Service levels 0, 1, and 2
//! - Last Will and Testament, credentials, clean/persistent sessions
//! - Keepalive with automatic PINGREQ
//! - Bounded outbound staging queue with explicit backpressure
//! - Connection agnostic: works over any transport implementing the
//!   [`network`] traits
//! - Fixed-capacity buffers throughout for predictable memory usage
//!
//! ## Architecture
//!
//! The crate splits along the protocol's own seams:
//!
//! - [`codec`]: pure extraction functions over inbound byte slices, fixed
//!   header fields, the remaining-length varint, topics, payloads, and
//!   message identifiers. Never panics, never reads out of bounds.
//! - [`packet`]: control-packet builders writing into a caller-owned
//!   buffer through an encode cursor.
//! - [`queue`]: the bounded ring buffer staging finished frames between
//!   the state machine and the transport writer.
//! - [`session`]: the per-connection state machine for handshake, receive
//!   dispatch, acknowledgment correlation, keepalive, and the typed
//!   callback hooks.
//! - [`runner`]: the supervisory loop that reconnects forever with a fixed
//!   backoff.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use libmqtt::codec::QoS;
//! use libmqtt::session::{ClientCallbacks, Session, SessionConfig};
//! # use libmqtt::network::{Close, Connection, Read, SetReadTimeout, Write};
//! # struct MockConnection;
//! # impl Read for MockConnection {
//! #     type Error = libmqtt::network::error::Error;
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl Write for MockConnection {
//! #     type Error = libmqtt::network::error::Error;
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Close for MockConnection {
//! #     type Error = libmqtt::network::error::Error;
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl SetReadTimeout for MockConnection {
//! #     type Error = libmqtt::network::error::Error;
//! #     fn set_read_timeout(&mut self, _seconds: Option<u16>) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Connection for MockConnection {}
//! # fn open_transport() -> MockConnection { MockConnection }
//!
//! struct Handler;
//!
//! impl ClientCallbacks for Handler {
//!     fn data(&mut self, topic: &str, payload: &[u8], _total: usize, _offset: usize) {
//!         // react to an inbound publish; the slices are only valid for
//!         // the duration of this call
//!         let _ = (topic, payload);
//!     }
//! }
//!
//! let config = SessionConfig {
//!     host: "test.mosquitto.org",
//!     port: 1883,
//!     client_id: "sensor-001",
//!     username: None,
//!     password: None,
//!     will: None,
//!     keepalive_seconds: 60,
//!     clean_session: true,
//!     subscribe_filter: Some("commands/sensor-001/#"),
//!     subscribe_qos: QoS::AtMostOnce,
//! };
//!
//! let mut session: Session<'_, MockConnection, Handler> = Session::new(config, Handler);
//! session.connect(open_transport()).unwrap();
//! session.publish("sensors/temperature", b"23.5", QoS::AtLeastOnce, false).unwrap();
//! loop {
//!     session.service_send().unwrap();
//!     if !session.poll().unwrap() {
//!         session.tick().unwrap();
//!     }
//! }
//! ```
//!
//! Configuration can also come from a JSON blob kept in flash; see
//! [`session::SessionConfig::from_json`].
//!
//! ## Platform Support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.)
//! - Linux-based IoT devices
//! - Any platform supporting Rust's `core` library
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `defmt`: Enable defmt formatting of public types for embedded debugging

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

/// Pure extraction functions over MQTT wire bytes.
pub mod codec;

/// Protocol-level error types shared across the crate.
pub mod error;

/// Transport traits the host implements for its socket layer.
pub mod network;

/// Control-packet builders over caller-owned buffers.
pub mod packet;

/// The bounded outbound staging queue.
pub mod queue;

/// The supervisory reconnect loop.
pub mod runner;

/// Session configuration, callbacks, and the protocol state machine.
pub mod session;
