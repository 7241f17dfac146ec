//! A transport abstraction for the MQTT session
//!
//! The session speaks MQTT over any reliable, ordered byte stream. This module
//! defines the small trait family a transport must implement: blocking reads
//! and writes, an explicit close, and a settable read timeout (used to bound
//! the CONNECT handshake and to pace the connected-phase driver). Concrete
//! implementations (lwIP sockets, `std::net::TcpStream`, a modem UART) live
//! with the host, not in this crate.
//!
//! Socket establishment, DNS resolution, and connect-retry policy belong to
//! the [`Connect`] implementation. The supervisory loop only asks it for a
//! fresh connection and backs off between attempts via [`Delay`].

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error types for transport operations
pub mod error;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connect, Connection, Delay, Read, SetReadTimeout, Write};
}

pub trait Read {
    /// Associated error type
    type Error: error::TransportError;
    /// Read data from the connection. `Ok(0)` means the peer performed an
    /// orderly close.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

pub trait Write {
    /// Associated error type
    type Error: error::TransportError;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// Control over the blocking-read timeout of a connection.
pub trait SetReadTimeout {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Arm (`Some(seconds)`) or clear (`None`) the read timeout. While armed,
    /// a blocking read that sees no data for the given number of seconds must
    /// fail with an error whose kind is
    /// [`ErrorKind::TimedOut`](error::ErrorKind::TimedOut).
    fn set_read_timeout(&mut self, seconds: Option<u16>) -> Result<(), Self::Error>;
}

/// A synchronous byte-stream connection to the broker
pub trait Connection: Read + Write + Close + SetReadTimeout {}

/// A synchronous connector (client side)
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection to `remote` (a `host:port` string). Implementations
    /// resolve DNS themselves when the host is not a dotted quad.
    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error>;
}

/// A blocking millisecond delay, used for the reconnect backoff.
pub trait Delay {
    /// Block the caller for at least `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}
