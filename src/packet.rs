//! MQTT control-packet construction.
//!
//! Every builder works in a caller-owned buffer: the session hands its single
//! outbound buffer in, the builder reserves room for the fixed header, writes
//! the variable header and payload, then [`MessageEncoder::finish`] backfills
//! the header and returns the wire frame as a slice. Nothing here allocates
//! and nothing writes past the buffer end; an append that would overflow
//! fails with [`Error::EncodeOverflow`] instead.
//!
//! ```
//! use libmqtt::packet;
//!
//! let mut buf = [0u8; 8];
//! let frame = packet::pingreq(&mut buf).unwrap();
//! assert_eq!(frame, [0xC0, 0x00]);
//! ```

use crate::codec::{PacketType, QoS};
use crate::error::Error;
use crate::session::SessionConfig;

/// Room reserved at the front of the buffer for the type byte plus a one- or
/// two-byte remaining-length varint.
const FIXED_HEADER_RESERVE: usize = 3;

/// Largest remaining length a two-byte varint can express.
const MAX_REMAINING_LENGTH: usize = 16383;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1

// CONNECT flag bits (MQTT 3.1.1 §3.1.2.3).
const CONNECT_FLAG_USERNAME: u8 = 1 << 7;
const CONNECT_FLAG_PASSWORD: u8 = 1 << 6;
const CONNECT_FLAG_WILL_RETAIN: u8 = 1 << 5;
const CONNECT_FLAG_WILL: u8 = 1 << 2;
const CONNECT_FLAG_CLEAN_SESSION: u8 = 1 << 1;

/// Allocates the 16-bit message identifiers for a session.
///
/// Ids increase monotonically and wrap around 16 bits, skipping 0: the
/// protocol reserves no sentinel, so 0 must never collide with "no id".
#[derive(Debug, Default)]
pub struct MessageIdAllocator {
    next: u16,
}

impl MessageIdAllocator {
    /// A fresh allocator; the first id handed out is 1.
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// The next id, never 0.
    pub fn next_id(&mut self) -> u16 {
        self.next = self.next.wrapping_add(1);
        if self.next == 0 {
            self.next = 1;
        }
        self.next
    }
}

/// An encode cursor over a caller-owned packet buffer.
pub struct MessageEncoder<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> MessageEncoder<'a> {
    /// Start a packet in `buf`, reserving the fixed-header region.
    pub fn new(buf: &'a mut [u8]) -> Result<Self, Error> {
        if buf.len() < FIXED_HEADER_RESERVE {
            return Err(Error::EncodeOverflow);
        }
        Ok(Self {
            buf,
            len: FIXED_HEADER_RESERVE,
        })
    }

    fn push(&mut self, byte: u8) -> Result<(), Error> {
        if self.len >= self.buf.len() {
            return Err(Error::EncodeOverflow);
        }
        self.buf[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    fn append_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self.len.checked_add(bytes.len()).ok_or(Error::EncodeOverflow)?;
        if end > self.buf.len() {
            return Err(Error::EncodeOverflow);
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    fn append_u16(&mut self, value: u16) -> Result<(), Error> {
        self.append_raw(&value.to_be_bytes())
    }

    /// Append a UTF-8 string as a 2-byte big-endian length prefix followed by
    /// the raw bytes.
    pub fn append_string(&mut self, s: &str) -> Result<(), Error> {
        let bytes = s.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(Error::EncodeOverflow);
        }
        self.append_u16(bytes.len() as u16)?;
        self.append_raw(bytes)
    }

    /// Append a message identifier. An `id_or_zero` of 0 auto-allocates the
    /// next id from the session's counter; the id actually written is
    /// returned either way.
    pub fn append_id(
        &mut self,
        id_or_zero: u16,
        ids: &mut MessageIdAllocator,
    ) -> Result<u16, Error> {
        let id = if id_or_zero == 0 {
            ids.next_id()
        } else {
            id_or_zero
        };
        self.append_u16(id)?;
        Ok(id)
    }

    /// Backfill the fixed header and hand back the finished wire frame.
    ///
    /// The remaining length is what was written past the reservation; it is
    /// encoded as one varint byte when it fits in 127, two otherwise, so the
    /// usable frame starts at offset 1 or 0 of the reserved region.
    pub fn finish(
        self,
        kind: PacketType,
        dup: bool,
        qos: QoS,
        retain: bool,
    ) -> Result<&'a [u8], Error> {
        let remaining = self.len - FIXED_HEADER_RESERVE;
        if remaining > MAX_REMAINING_LENGTH {
            return Err(Error::EncodeOverflow);
        }
        let flags = ((kind as u8) << 4) | ((dup as u8) << 3) | ((qos as u8) << 1) | retain as u8;
        let start = if remaining > 127 {
            self.buf[0] = flags;
            self.buf[1] = 0x80 | (remaining % 128) as u8;
            self.buf[2] = (remaining / 128) as u8;
            0
        } else {
            self.buf[1] = flags;
            self.buf[2] = remaining as u8;
            1
        };
        Ok(&self.buf[start..self.len])
    }
}

impl core::fmt::Debug for MessageEncoder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageEncoder")
            .field("len", &self.len)
            .field("capacity", &self.buf.len())
            .finish()
    }
}

/// Build a CONNECT packet from the session configuration.
///
/// Payload order is protocol-mandated: client id, then will topic and will
/// message when a will is configured, then username, then password, with
/// each optional field mirrored by its presence bit in the CONNECT flags
/// byte.
pub fn connect<'a>(buf: &'a mut [u8], config: &SessionConfig<'_>) -> Result<&'a [u8], Error> {
    if config.client_id.is_empty() {
        return Err(Error::MissingField);
    }
    let mut enc = MessageEncoder::new(buf)?;

    // Variable header
    enc.append_string(PROTOCOL_NAME)?;
    enc.push(PROTOCOL_LEVEL)?;
    let mut flags = 0u8;
    if config.clean_session {
        flags |= CONNECT_FLAG_CLEAN_SESSION;
    }
    if let Some(will) = &config.will {
        flags |= CONNECT_FLAG_WILL | ((will.qos as u8) << 3);
        if will.retain {
            flags |= CONNECT_FLAG_WILL_RETAIN;
        }
    }
    if config.username.is_some() {
        flags |= CONNECT_FLAG_USERNAME;
    }
    if config.password.is_some() {
        flags |= CONNECT_FLAG_PASSWORD;
    }
    enc.push(flags)?;
    enc.append_u16(config.keepalive_seconds)?;

    // Payload
    enc.append_string(config.client_id)?;
    if let Some(will) = &config.will {
        enc.append_string(will.topic)?;
        enc.append_string(will.message)?;
    }
    if let Some(username) = config.username {
        enc.append_string(username)?;
    }
    if let Some(password) = config.password {
        enc.append_string(password)?;
    }
    enc.finish(PacketType::Connect, false, QoS::AtMostOnce, false)
}

/// Build a PUBLISH packet. QoS > 0 appends an auto-allocated message id,
/// returned alongside the frame; QoS 0 carries no id.
pub fn publish<'a>(
    buf: &'a mut [u8],
    topic: &str,
    payload: &[u8],
    qos: QoS,
    retain: bool,
    ids: &mut MessageIdAllocator,
) -> Result<(&'a [u8], Option<u16>), Error> {
    if topic.is_empty() {
        return Err(Error::MissingField);
    }
    let mut enc = MessageEncoder::new(buf)?;
    enc.append_string(topic)?;
    let id = if qos != QoS::AtMostOnce {
        Some(enc.append_id(0, ids)?)
    } else {
        None
    };
    enc.append_raw(payload)?;
    Ok((enc.finish(PacketType::Publish, false, qos, retain)?, id))
}

/// Build a SUBSCRIBE packet for a single topic filter.
pub fn subscribe<'a>(
    buf: &'a mut [u8],
    topic: &str,
    qos: QoS,
    ids: &mut MessageIdAllocator,
) -> Result<(&'a [u8], u16), Error> {
    if topic.is_empty() {
        return Err(Error::MissingField);
    }
    let mut enc = MessageEncoder::new(buf)?;
    let id = enc.append_id(0, ids)?;
    enc.append_string(topic)?;
    enc.push(qos as u8)?;
    // Reserved flag bits 0b0010 ride in the QoS field of the fixed header.
    Ok((enc.finish(PacketType::Subscribe, false, QoS::AtLeastOnce, false)?, id))
}

/// Build an UNSUBSCRIBE packet for a single topic filter.
pub fn unsubscribe<'a>(
    buf: &'a mut [u8],
    topic: &str,
    ids: &mut MessageIdAllocator,
) -> Result<(&'a [u8], u16), Error> {
    if topic.is_empty() {
        return Err(Error::MissingField);
    }
    let mut enc = MessageEncoder::new(buf)?;
    let id = enc.append_id(0, ids)?;
    enc.append_string(topic)?;
    Ok((enc.finish(PacketType::Unsubscribe, false, QoS::AtLeastOnce, false)?, id))
}

fn id_only<'a>(buf: &'a mut [u8], kind: PacketType, qos: QoS, id: u16) -> Result<&'a [u8], Error> {
    let mut enc = MessageEncoder::new(buf)?;
    enc.append_u16(id)?;
    enc.finish(kind, false, qos, false)
}

/// Build a PUBACK packet (QoS 1 acknowledgment).
pub fn puback(buf: &mut [u8], id: u16) -> Result<&[u8], Error> {
    id_only(buf, PacketType::Puback, QoS::AtMostOnce, id)
}

/// Build a PUBREC packet (QoS 2, step 1).
pub fn pubrec(buf: &mut [u8], id: u16) -> Result<&[u8], Error> {
    id_only(buf, PacketType::Pubrec, QoS::AtMostOnce, id)
}

/// Build a PUBREL packet (QoS 2, step 2; reserved flag bits 0b0010).
pub fn pubrel(buf: &mut [u8], id: u16) -> Result<&[u8], Error> {
    id_only(buf, PacketType::Pubrel, QoS::AtLeastOnce, id)
}

/// Build a PUBCOMP packet (QoS 2, step 3).
pub fn pubcomp(buf: &mut [u8], id: u16) -> Result<&[u8], Error> {
    id_only(buf, PacketType::Pubcomp, QoS::AtMostOnce, id)
}

/// Build a PINGREQ packet.
pub fn pingreq(buf: &mut [u8]) -> Result<&[u8], Error> {
    MessageEncoder::new(buf)?.finish(PacketType::Pingreq, false, QoS::AtMostOnce, false)
}

/// Build a PINGRESP packet (the reply to a broker-originated PINGREQ).
pub fn pingresp(buf: &mut [u8]) -> Result<&[u8], Error> {
    MessageEncoder::new(buf)?.finish(PacketType::Pingresp, false, QoS::AtMostOnce, false)
}

/// Build a DISCONNECT packet.
pub fn disconnect(buf: &mut [u8]) -> Result<&[u8], Error> {
    MessageEncoder::new(buf)?.finish(PacketType::Disconnect, false, QoS::AtMostOnce, false)
}

/// Build the acknowledgment frame of the given kind carrying `id`.
///
/// CONNACK, SUBACK, and UNSUBACK are only ever sent by a broker; asking for
/// one here is a programming error and fails fast with
/// [`Error::BrokerOnlyPacket`].
pub fn ack(buf: &mut [u8], kind: PacketType, id: u16) -> Result<&[u8], Error> {
    match kind {
        PacketType::Puback => puback(buf, id),
        PacketType::Pubrec => pubrec(buf, id),
        PacketType::Pubrel => pubrel(buf, id),
        PacketType::Pubcomp => pubcomp(buf, id),
        PacketType::Connack | PacketType::Suback | PacketType::Unsuback => {
            Err(Error::BrokerOnlyPacket)
        }
        _ => Err(Error::UnexpectedPacketType),
    }
}
