//! MQTT session: configuration, reaction callbacks, and the protocol state
//! machine.
//!
//! One [`Session`] exists per broker connection. It owns the transport
//! handle, the single outbound packet buffer, the single inbound read buffer,
//! and the protocol bookkeeping (connection phase, the one in-flight request
//! awaiting acknowledgment, keepalive countdown). The host drives it with
//! three calls: [`Session::poll`] for receive-dispatch,
//! [`Session::service_send`] to drain staged frames, and [`Session::tick`]
//! once per idle second for keepalive. Or it hands the whole thing to
//! [`Runner`](crate::runner::Runner).

mod client;

pub use client::Session;

use serde::Deserialize;

use crate::codec::QoS;

/// Connection lifecycle phases of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport attached.
    Disconnected,
    /// CONNECT sent, CONNACK not yet validated.
    Connecting,
    /// Handshake accepted; the dispatch loops are live.
    Connected,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectionState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConnectionState::Disconnected => defmt::write!(f, "Disconnected"),
            ConnectionState::Connecting => defmt::write!(f, "Connecting"),
            ConnectionState::Connected => defmt::write!(f, "Connected"),
        }
    }
}

/// Last Will and Testament: the message the broker publishes on this
/// client's behalf if the connection drops without a DISCONNECT.
#[derive(Debug, Clone, Deserialize)]
pub struct Will<'a> {
    /// Topic the will is published to.
    #[serde(borrow)]
    pub topic: &'a str,
    /// Will message body.
    #[serde(borrow)]
    pub message: &'a str,
    /// QoS the broker publishes the will with.
    #[serde(default)]
    pub qos: QoS,
    /// Whether the broker retains the will message.
    #[serde(default)]
    pub retain: bool,
}

/// Broker and session configuration.
///
/// All string fields borrow from the caller, typically a configuration blob
/// held in flash for the lifetime of the program.
///
/// ```
/// use libmqtt::session::SessionConfig;
///
/// let blob = br#"{"host":"broker.local","port":1883,"client_id":"pump-7"}"#;
/// let config = SessionConfig::from_json(blob).unwrap();
/// assert_eq!(config.port, 1883);
/// assert_eq!(config.keepalive_seconds, 60);
/// assert!(config.clean_session);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig<'a> {
    /// Broker host name or dotted-quad address.
    #[serde(borrow)]
    pub host: &'a str,
    /// Broker TCP port (1883 for plain MQTT).
    pub port: u16,
    /// Client identifier, unique per broker.
    #[serde(borrow)]
    pub client_id: &'a str,
    /// Optional username.
    #[serde(borrow, default)]
    pub username: Option<&'a str>,
    /// Optional password.
    #[serde(borrow, default)]
    pub password: Option<&'a str>,
    /// Optional Last Will and Testament.
    #[serde(borrow, default)]
    pub will: Option<Will<'a>>,
    /// Keepalive interval in seconds; 0 disables keepalive pings.
    #[serde(default = "default_keepalive")]
    pub keepalive_seconds: u16,
    /// Whether the broker discards previous session state on connect.
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    /// Topic filter subscribed automatically after every successful connect.
    #[serde(borrow, default)]
    pub subscribe_filter: Option<&'a str>,
    /// Maximum QoS requested for the automatic subscription.
    #[serde(default)]
    pub subscribe_qos: QoS,
}

fn default_keepalive() -> u16 {
    60
}

fn default_clean_session() -> bool {
    true
}

impl<'a> SessionConfig<'a> {
    /// Parse a configuration blob kept as JSON, borrowing its strings.
    pub fn from_json(blob: &'a [u8]) -> Result<Self, serde_json_core::de::Error> {
        let (config, _) = serde_json_core::de::from_slice(blob)?;
        Ok(config)
    }

    /// The `host:port` string handed to the transport connector.
    pub fn remote_addr(&self) -> heapless::String<80> {
        use core::fmt::Write as _;
        let mut addr = heapless::String::new();
        let _ = write!(addr, "{}:{}", self.host, self.port);
        addr
    }
}

/// Reaction hooks invoked synchronously by the session at defined transition
/// points.
///
/// All hooks have empty default bodies; implement the ones the application
/// cares about. The `data` hook receives topic and payload as borrowed
/// slices valid only for the duration of the call; copy out anything that
/// must outlive it. An oversized publish arrives as several `data` calls
/// with a growing `offset` and the same `total_len`.
pub trait ClientCallbacks {
    /// First successful broker handshake.
    fn connected(&mut self) {}
    /// The session lost its connection (or was shut down).
    fn disconnected(&mut self) {}
    /// A successful handshake after a previous connection was lost.
    fn reconnected(&mut self) {}
    /// The broker acknowledged the subscription with this message id.
    fn subscribed(&mut self, _id: u16) {}
    /// A QoS 1 or QoS 2 publish with this message id completed its
    /// acknowledgment exchange.
    fn published(&mut self, _id: u16) {}
    /// An inbound publish chunk.
    fn data(&mut self, _topic: &str, _payload: &[u8], _total_len: usize, _offset: usize) {}
}
