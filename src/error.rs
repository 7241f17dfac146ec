//! Protocol-level error types.
//!
//! The codec and the packet builders return these directly; the session folds
//! transport failures into [`Error::Transport`] carrying the coarse
//! [`ErrorKind`] so callers never see a concrete socket error type.

use crate::codec::ConnectReturnCode;
use crate::network::error::ErrorKind;

/// Errors raised while encoding, decoding, or driving an MQTT session.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An append would run past the end of the packet buffer.
    EncodeOverflow,
    /// A declared length exceeds the bytes actually present, or a
    /// remaining-length varint never terminates within its 4-byte bound.
    DecodeTruncated,
    /// The inbound packet is not one this client can receive at this point
    /// (for example, a non-CONNACK response to CONNECT).
    UnexpectedPacketType,
    /// The broker refused the connection with one of the defined return codes.
    ConnectionRefused(ConnectReturnCode),
    /// A socket-level failure, reduced to its triage kind.
    Transport(ErrorKind),
    /// The outbound staging queue has no room for the frame.
    QueueFull,
    /// The outbound staging queue was closed by an explicit shutdown.
    QueueClosed,
    /// The requested packet is only ever sent by a broker; building it in a
    /// client is a programming error.
    BrokerOnlyPacket,
    /// A required field (client id, topic) is empty.
    MissingField,
    /// The operation needs an established session.
    NotConnected,
}

impl Error {
    /// Whether this failure requires tearing the socket down and re-running
    /// the connect sequence.
    ///
    /// Per-packet encode/decode problems are not fatal: the offending packet
    /// is dropped and logged, and the session keeps running.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::UnexpectedPacketType
                | Error::ConnectionRefused(_)
                | Error::QueueClosed
                | Error::NotConnected
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::EncodeOverflow => defmt::write!(f, "EncodeOverflow"),
            Error::DecodeTruncated => defmt::write!(f, "DecodeTruncated"),
            Error::UnexpectedPacketType => defmt::write!(f, "UnexpectedPacketType"),
            Error::ConnectionRefused(code) => {
                defmt::write!(f, "ConnectionRefused({})", *code as u8)
            }
            Error::Transport(kind) => defmt::write!(f, "Transport({})", kind),
            Error::QueueFull => defmt::write!(f, "QueueFull"),
            Error::QueueClosed => defmt::write!(f, "QueueClosed"),
            Error::BrokerOnlyPacket => defmt::write!(f, "BrokerOnlyPacket"),
            Error::MissingField => defmt::write!(f, "MissingField"),
            Error::NotConnected => defmt::write!(f, "NotConnected"),
        }
    }
}
