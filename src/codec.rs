//! MQTT 3.1.1 wire-format extraction.
//!
//! Pure, allocation-free functions over byte slices. Every function here
//! returns an explicit `Option`/`Result` and never reads past the end of the
//! slice, whatever the declared lengths inside the packet claim.
//!
//! ```
//! use libmqtt::codec::{self, PacketType};
//!
//! let puback = [0x40, 0x02, 0x00, 0x2A];
//! assert_eq!(codec::packet_type(&puback), Some(PacketType::Puback));
//! assert_eq!(codec::packet_id(&puback), Some(42));
//! ```

use crate::error::Error;

/// MQTT control-packet types (fixed-header type nibble).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)] // the names are the protocol's own
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl PacketType {
    /// Decode the type from a packet's first byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte >> 4 {
            1 => Some(Self::Connect),
            2 => Some(Self::Connack),
            3 => Some(Self::Publish),
            4 => Some(Self::Puback),
            5 => Some(Self::Pubrec),
            6 => Some(Self::Pubrel),
            7 => Some(Self::Pubcomp),
            8 => Some(Self::Subscribe),
            9 => Some(Self::Suback),
            10 => Some(Self::Unsubscribe),
            11 => Some(Self::Unsuback),
            12 => Some(Self::Pingreq),
            13 => Some(Self::Pingresp),
            14 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// Quality of Service levels.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// At most once (fire and forget)
    #[default]
    AtMostOnce = 0,
    /// At least once (acknowledged delivery)
    AtLeastOnce = 1,
    /// Exactly once (assured delivery)
    ExactlyOnce = 2,
}

impl QoS {
    /// Decode a 2-bit QoS field. `0b11` is reserved and yields `None`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte & 0x03 {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }
}

// Configuration blobs carry QoS as the numeric protocol level.
impl<'de> serde::Deserialize<'de> for QoS {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match u8::deserialize(deserializer)? {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(serde::de::Error::custom("QoS level must be 0, 1, or 2")),
        }
    }
}

/// CONNACK return codes (MQTT 3.1.1 table 3.1).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    /// Connection accepted.
    Accepted = 0,
    /// The broker does not support this protocol level.
    RefusedProtocolVersion = 1,
    /// The client identifier is well-formed but not allowed.
    RefusedIdentifierRejected = 2,
    /// The MQTT service is unavailable.
    RefusedServerUnavailable = 3,
    /// Malformed user name or password.
    RefusedBadCredentials = 4,
    /// The client is not authorized to connect.
    RefusedNotAuthorized = 5,
}

impl ConnectReturnCode {
    /// Decode a return-code byte; values above 5 are reserved.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Accepted),
            1 => Some(Self::RefusedProtocolVersion),
            2 => Some(Self::RefusedIdentifierRejected),
            3 => Some(Self::RefusedServerUnavailable),
            4 => Some(Self::RefusedBadCredentials),
            5 => Some(Self::RefusedNotAuthorized),
            _ => None,
        }
    }
}

/// Control-packet type from byte 0.
pub fn packet_type(buf: &[u8]) -> Option<PacketType> {
    PacketType::from_byte(*buf.first()?)
}

/// DUP flag from byte 0 (bit 3).
pub fn dup(buf: &[u8]) -> Option<bool> {
    Some(buf.first()? & 0x08 != 0)
}

/// QoS from byte 0 (bits 1-2). Only meaningful for PUBLISH.
pub fn qos(buf: &[u8]) -> Option<QoS> {
    QoS::from_byte((buf.first()? & 0x06) >> 1)
}

/// RETAIN flag from byte 0 (bit 0).
pub fn retain(buf: &[u8]) -> Option<bool> {
    Some(buf.first()? & 0x01 != 0)
}

/// Decode the remaining-length varint starting at byte 1.
///
/// Each byte contributes 7 bits; the `0x80` continuation bit signals another
/// byte follows, up to the protocol maximum of 4 bytes. A varint whose
/// continuation bit never clears within that bound, or a buffer that ends
/// mid-varint, is [`Error::DecodeTruncated`], never an out-of-bounds read.
///
/// Returns `(remaining_length, fixed_header_len)` where `fixed_header_len`
/// covers the type byte plus the varint bytes.
pub fn remaining_length(buf: &[u8]) -> Result<(usize, usize), Error> {
    let mut value = 0usize;
    for i in 0..4 {
        let byte = *buf.get(1 + i).ok_or(Error::DecodeTruncated)?;
        value |= ((byte & 0x7f) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, 2 + i));
        }
    }
    Err(Error::DecodeTruncated)
}

/// Total on-the-wire packet length: fixed header plus remaining length.
pub fn total_length(buf: &[u8]) -> Result<usize, Error> {
    let (remaining, header_len) = remaining_length(buf)?;
    Ok(header_len + remaining)
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*buf.get(at)?, *buf.get(at + 1)?]))
}

/// Topic of a PUBLISH packet: the length-prefixed UTF-8 string right after
/// the fixed header. `None` when the declared length exceeds the bytes
/// present.
pub fn publish_topic(buf: &[u8]) -> Option<&[u8]> {
    if packet_type(buf)? != PacketType::Publish {
        return None;
    }
    let (_, header_len) = remaining_length(buf).ok()?;
    let topic_len = read_u16(buf, header_len)? as usize;
    buf.get(header_len + 2..header_len + 2 + topic_len)
}

/// Byte offset of the PUBLISH payload from the start of the packet: after
/// the topic, plus 2 message-id bytes when QoS > 0. `None` when the offsets
/// are inconsistent with the declared remaining length.
pub fn publish_payload_offset(buf: &[u8]) -> Option<usize> {
    if packet_type(buf)? != PacketType::Publish {
        return None;
    }
    let (remaining, header_len) = remaining_length(buf).ok()?;
    let topic_len = read_u16(buf, header_len)? as usize;
    let mut at = header_len + 2 + topic_len;
    if qos(buf)? != QoS::AtMostOnce {
        at += 2;
    }
    if at > header_len + remaining {
        return None;
    }
    Some(at)
}

/// PUBLISH payload bytes present in `buf`, up to the declared remaining
/// length. For an oversized message this is only the first slice; the caller
/// tracks the rest by offset.
pub fn publish_payload(buf: &[u8]) -> Option<&[u8]> {
    let at = publish_payload_offset(buf)?;
    let (remaining, header_len) = remaining_length(buf).ok()?;
    let end = (header_len + remaining).min(buf.len());
    buf.get(at..end)
}

/// Message identifier of a packet, when it has one.
///
/// For PUBLISH the id exists only when QoS > 0: a QoS 0 publish has no id
/// by construction and yields `None`, never a fabricated 0. For the
/// acknowledgment family (and SUBSCRIBE/UNSUBSCRIBE requests) the id is the
/// 2 bytes after the remaining length; that shortcut is only valid while the
/// remaining length fits in one byte, so a multi-byte varint on those types
/// yields `None` rather than misread bytes.
pub fn packet_id(buf: &[u8]) -> Option<u16> {
    match packet_type(buf)? {
        PacketType::Publish => {
            if qos(buf)? == QoS::AtMostOnce {
                return None;
            }
            let (_, header_len) = remaining_length(buf).ok()?;
            let topic_len = read_u16(buf, header_len)? as usize;
            read_u16(buf, header_len + 2 + topic_len)
        }
        PacketType::Puback
        | PacketType::Pubrec
        | PacketType::Pubrel
        | PacketType::Pubcomp
        | PacketType::Suback
        | PacketType::Unsuback
        | PacketType::Subscribe
        | PacketType::Unsubscribe => {
            if *buf.get(1)? & 0x80 != 0 {
                return None;
            }
            read_u16(buf, 2)
        }
        _ => None,
    }
}

/// Return code of a CONNACK packet. `None` when the packet is not a
/// well-formed CONNACK or carries a reserved code.
pub fn connect_return_code(buf: &[u8]) -> Option<ConnectReturnCode> {
    if packet_type(buf)? != PacketType::Connack {
        return None;
    }
    if *buf.get(1)? != 2 {
        return None;
    }
    ConnectReturnCode::from_byte(*buf.get(3)?)
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectReturnCode {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_header_flags() {
        // PUBLISH, dup, QoS 1, retain
        let buf = [0x3B, 0x00];
        assert_eq!(packet_type(&buf), Some(PacketType::Publish));
        assert_eq!(dup(&buf), Some(true));
        assert_eq!(qos(&buf), Some(QoS::AtLeastOnce));
        assert_eq!(retain(&buf), Some(true));
    }

    #[test]
    fn empty_buffer_yields_none() {
        assert_eq!(packet_type(&[]), None);
        assert_eq!(qos(&[]), None);
        assert_eq!(packet_id(&[]), None);
    }

    #[test]
    fn remaining_length_single_byte() {
        assert_eq!(remaining_length(&[0x30, 0x00]), Ok((0, 2)));
        assert_eq!(remaining_length(&[0x30, 0x01]), Ok((1, 2)));
        assert_eq!(remaining_length(&[0x30, 0x7F]), Ok((127, 2)));
    }

    #[test]
    fn remaining_length_multi_byte() {
        assert_eq!(remaining_length(&[0x30, 0x80, 0x01]), Ok((128, 3)));
        assert_eq!(remaining_length(&[0x30, 0xFF, 0x7F]), Ok((16383, 3)));
    }

    #[test]
    fn remaining_length_never_terminating() {
        // Continuation bit set on all four varint bytes: protocol error,
        // not an unbounded walk through the buffer.
        let buf = [0x30, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80];
        assert_eq!(remaining_length(&buf), Err(Error::DecodeTruncated));
    }

    #[test]
    fn remaining_length_truncated_buffer() {
        assert_eq!(remaining_length(&[0x30]), Err(Error::DecodeTruncated));
        assert_eq!(remaining_length(&[0x30, 0x80]), Err(Error::DecodeTruncated));
    }

    #[test]
    fn publish_topic_and_payload() {
        // PUBLISH QoS 0, topic "a/b", payload "hi"
        let buf = [0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i'];
        assert_eq!(publish_topic(&buf), Some(&b"a/b"[..]));
        assert_eq!(publish_payload(&buf), Some(&b"hi"[..]));
        assert_eq!(packet_id(&buf), None);
    }

    #[test]
    fn publish_topic_declared_length_too_long() {
        let buf = [0x30, 0x07, 0x00, 0x40, b'a'];
        assert_eq!(publish_topic(&buf), None);
    }

    #[test]
    fn publish_qos1_has_id_after_topic() {
        // PUBLISH QoS 1, topic "t", id 0x0102, payload "x"
        let buf = [0x32, 0x06, 0x00, 0x01, b't', 0x01, 0x02, b'x'];
        assert_eq!(packet_id(&buf), Some(0x0102));
        assert_eq!(publish_payload(&buf), Some(&b"x"[..]));
    }

    #[test]
    fn ack_family_id_requires_single_byte_length() {
        let puback = [0x40, 0x02, 0x12, 0x34];
        assert_eq!(packet_id(&puback), Some(0x1234));
        // Multi-byte remaining length on an ack is not a layout this client
        // can correlate; it must fail cleanly.
        let odd = [0x40, 0x80, 0x01, 0x12, 0x34];
        assert_eq!(packet_id(&odd), None);
    }

    #[test]
    fn connack_return_codes() {
        let ok = [0x20, 0x02, 0x00, 0x00];
        assert_eq!(connect_return_code(&ok), Some(ConnectReturnCode::Accepted));
        let refused = [0x20, 0x02, 0x00, 0x05];
        assert_eq!(
            connect_return_code(&refused),
            Some(ConnectReturnCode::RefusedNotAuthorized)
        );
        let reserved = [0x20, 0x02, 0x00, 0x2A];
        assert_eq!(connect_return_code(&reserved), None);
        let wrong_type = [0x90, 0x02, 0x00, 0x00];
        assert_eq!(connect_return_code(&wrong_type), None);
    }

    #[test]
    fn total_length_covers_header_and_body() {
        let buf = [0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i'];
        assert_eq!(total_length(&buf), Ok(9));
    }
}
