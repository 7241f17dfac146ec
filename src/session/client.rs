//! The session state machine: handshake, receive dispatch, and the send
//! drain.

use log::{debug, info, warn};

use crate::codec::{self, ConnectReturnCode, PacketType, QoS};
use crate::error::Error;
use crate::network::error::{ErrorKind, TransportError};
use crate::network::{Close, Connection, Read, SetReadTimeout, Write};
use crate::packet::{self, MessageIdAllocator};
use crate::queue::OutboundQueue;

use super::{ClientCallbacks, ConnectionState, SessionConfig};

/// Read timeout, in seconds, while waiting for the CONNACK response. A
/// deliberate finite bound; the connected-phase timeout is the driver's
/// choice.
const HANDSHAKE_TIMEOUT_SECS: u16 = 10;

/// Longest topic copied out for multi-chunk delivery.
const MAX_TOPIC_LEN: usize = 256;

/// The single in-flight request awaiting acknowledgment.
///
/// The protocol design supports exactly one outstanding `(type, id)` pair at
/// a time; there is no per-packet correlation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    kind: PacketType,
    id: u16,
}

/// An MQTT 3.1.1 client session over a generic transport connection.
///
/// `BUF` sizes both the outbound packet buffer and the inbound read buffer;
/// `QUEUE` and `FRAMES` size the outbound staging queue in bytes and frames.
pub struct Session<
    'a,
    C: Connection,
    E: ClientCallbacks,
    const BUF: usize = 1024,
    const QUEUE: usize = 2048,
    const FRAMES: usize = 16,
> {
    config: SessionConfig<'a>,
    callbacks: E,
    conn: Option<C>,
    state: ConnectionState,
    pending: Option<Pending>,
    ids: MessageIdAllocator,
    queue: OutboundQueue<QUEUE, FRAMES>,
    out_buf: [u8; BUF],
    in_buf: [u8; BUF],
    keepalive_left: u16,
    ever_connected: bool,
    // multi-chunk publish reception
    topic: heapless::String<MAX_TOPIC_LEN>,
    message_length: usize,
    message_length_read: usize,
}

impl<'a, C, E, const BUF: usize, const QUEUE: usize, const FRAMES: usize>
    Session<'a, C, E, BUF, QUEUE, FRAMES>
where
    C: Connection,
    E: ClientCallbacks,
{
    /// A disconnected session holding its configuration and callbacks.
    pub fn new(config: SessionConfig<'a>, callbacks: E) -> Self {
        Self {
            config,
            callbacks,
            conn: None,
            state: ConnectionState::Disconnected,
            pending: None,
            ids: MessageIdAllocator::new(),
            queue: OutboundQueue::new(),
            out_buf: [0; BUF],
            in_buf: [0; BUF],
            keepalive_left: 0,
            ever_connected: false,
            topic: heapless::String::new(),
            message_length: 0,
            message_length_read: 0,
        }
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the handshake has completed on the current transport.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig<'a> {
        &self.config
    }

    /// The registered callbacks.
    pub fn callbacks(&self) -> &E {
        &self.callbacks
    }

    /// Mutable access to the registered callbacks.
    pub fn callbacks_mut(&mut self) -> &mut E {
        &mut self.callbacks
    }

    /// Run the MQTT handshake over a freshly opened transport connection.
    ///
    /// Writes CONNECT directly (the staging queue is not yet draining),
    /// reads the response under a 10-second timeout, and requires a CONNACK
    /// with the ACCEPTED return code. Any read error, wrong packet type, or
    /// refusal closes the connection and returns the failure for the
    /// supervisory loop to retry.
    pub fn connect(&mut self, mut conn: C) -> Result<(), Error> {
        self.state = ConnectionState::Connecting;
        info!(
            "connecting to {}:{} as {:?}",
            self.config.host, self.config.port, self.config.client_id
        );
        match self.handshake(&mut conn) {
            Ok(()) => {
                self.conn = Some(conn);
                self.state = ConnectionState::Connected;
                self.pending = None;
                self.queue.reset();
                self.keepalive_left = self.keepalive_window();
                if self.ever_connected {
                    self.callbacks.reconnected();
                } else {
                    self.ever_connected = true;
                    self.callbacks.connected();
                }
                Ok(())
            }
            Err(e) => {
                let _ = conn.close();
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    fn handshake(&mut self, conn: &mut C) -> Result<(), Error> {
        if let Err(e) = conn.set_read_timeout(Some(HANDSHAKE_TIMEOUT_SECS)) {
            warn!("failed to arm the handshake timeout: {:?}", e);
            return Err(Error::Transport(ErrorKind::Other));
        }
        let frame = packet::connect(&mut self.out_buf, &self.config)?;
        write_all(conn, frame)?;

        let mut connack = [0u8; 4];
        read_exact(conn, &mut connack, false)?;
        if codec::packet_type(&connack) != Some(PacketType::Connack) {
            warn!(
                "expected connack, got {:?}",
                codec::packet_type(&connack)
            );
            return Err(Error::UnexpectedPacketType);
        }
        match codec::connect_return_code(&connack) {
            Some(ConnectReturnCode::Accepted) => {}
            Some(code) => {
                warn!("broker refused the connection: {:?}", code);
                return Err(Error::ConnectionRefused(code));
            }
            None => return Err(Error::UnexpectedPacketType),
        }
        if let Err(e) = conn.set_read_timeout(None) {
            warn!("failed to clear the handshake timeout: {:?}", e);
            return Err(Error::Transport(ErrorKind::Other));
        }
        info!("broker accepted the connection");
        Ok(())
    }

    /// Arm or clear the read timeout of the attached connection. The driver
    /// uses this as its scheduling quantum between dispatch and send work.
    pub fn set_read_timeout(&mut self, seconds: Option<u16>) -> Result<(), Error> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        conn.set_read_timeout(seconds).map_err(|e| {
            warn!("set_read_timeout failed: {:?}", e);
            Error::Transport(ErrorKind::Other)
        })
    }

    /// Stage a SUBSCRIBE for `topic` and return its message id.
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, Error> {
        self.require_connected()?;
        self.warn_if_pending();
        let (frame, id) = packet::subscribe(&mut self.out_buf, topic, qos, &mut self.ids)?;
        self.queue.push(frame)?;
        info!("subscribe queued, topic {:?}, id {}", topic, id);
        Ok(id)
    }

    /// Stage an UNSUBSCRIBE for `topic` and return its message id.
    pub fn unsubscribe(&mut self, topic: &str) -> Result<u16, Error> {
        self.require_connected()?;
        self.warn_if_pending();
        let (frame, id) = packet::unsubscribe(&mut self.out_buf, topic, &mut self.ids)?;
        self.queue.push(frame)?;
        info!("unsubscribe queued, topic {:?}, id {}", topic, id);
        Ok(id)
    }

    /// Stage a PUBLISH. Returns the auto-allocated message id for QoS 1 and
    /// QoS 2, `None` for QoS 0.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<Option<u16>, Error> {
        self.require_connected()?;
        if qos != QoS::AtMostOnce {
            self.warn_if_pending();
        }
        let (frame, id) =
            packet::publish(&mut self.out_buf, topic, payload, qos, retain, &mut self.ids)?;
        self.queue.push(frame)?;
        debug!("publish queued, topic {:?}, {} bytes", topic, payload.len());
        Ok(id)
    }

    /// Stage a PINGREQ.
    pub fn ping(&mut self) -> Result<(), Error> {
        self.require_connected()?;
        let frame = packet::pingreq(&mut self.out_buf)?;
        self.queue.push(frame)
    }

    /// Drain staged frames to the transport.
    ///
    /// Frames leave in chunks no larger than the session buffer. When a
    /// frame that awaits an acknowledgment starts leaving (SUBSCRIBE,
    /// UNSUBSCRIBE, or a QoS > 0 PUBLISH), its header is re-inspected and
    /// recorded as the pending request for correlation; reply frames never
    /// overwrite the pending pair.
    pub fn service_send(&mut self) -> Result<(), Error> {
        self.require_connected()?;
        let mut sent_any = false;
        while self.queue.pending_frame().is_some() {
            let at_start = self.queue.at_frame_start();
            let Some((n, _)) = self.queue.pop_chunk(&mut self.out_buf) else {
                break;
            };
            if at_start {
                self.note_pending(n);
            }
            let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
            write_all(conn, &self.out_buf[..n])?;
            sent_any = true;
        }
        if sent_any {
            self.keepalive_left = self.keepalive_window();
        }
        Ok(())
    }

    fn note_pending(&mut self, n: usize) {
        let head = &self.out_buf[..n];
        let Some(kind) = codec::packet_type(head) else {
            return;
        };
        let awaits_ack = match kind {
            PacketType::Subscribe | PacketType::Unsubscribe => true,
            PacketType::Publish => codec::qos(head).is_some_and(|q| q != QoS::AtMostOnce),
            _ => false,
        };
        if !awaits_ack {
            return;
        }
        if let Some(id) = codec::packet_id(head) {
            self.pending = Some(Pending { kind, id });
            debug!("pending request: {:?} id {}", kind, id);
        }
    }

    /// Advance the keepalive countdown by one idle second.
    ///
    /// With nothing staged to send, the countdown runs from half the
    /// keepalive interval; when it reaches zero a PINGREQ is staged and the
    /// window restarts. A keepalive of 0 disables pings.
    pub fn tick(&mut self) -> Result<(), Error> {
        if self.state != ConnectionState::Connected || self.config.keepalive_seconds == 0 {
            return Ok(());
        }
        if !self.queue.is_empty() {
            return Ok(());
        }
        self.keepalive_left = self.keepalive_left.saturating_sub(1);
        if self.keepalive_left == 0 {
            self.keepalive_left = self.keepalive_window();
            debug!("keepalive window elapsed, pingreq queued");
            let frame = packet::pingreq(&mut self.out_buf)?;
            self.queue.push(frame)?;
        }
        Ok(())
    }

    fn keepalive_window(&self) -> u16 {
        (self.config.keepalive_seconds / 2).max(1)
    }

    /// Read and react to one inbound packet.
    ///
    /// Returns `Ok(true)` when a packet was dispatched, `Ok(false)` when the
    /// read timed out with nothing to do (an idle cycle). A zero-length
    /// read means the peer closed; it surfaces as a transport error so the
    /// supervisory loop falls through to reconnect.
    pub fn poll(&mut self) -> Result<bool, Error> {
        self.require_connected()?;
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;

        // Fixed-header type byte. A timeout here is an idle cycle.
        let n = match conn.read(&mut self.in_buf[..1]) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(false),
            Err(e) => {
                warn!("transport read failed: {:?}", e);
                return Err(Error::Transport(e.kind()));
            }
        };
        if n == 0 {
            info!("connection closed by peer");
            return Err(Error::Transport(ErrorKind::Closed));
        }

        // Remaining-length varint, bounded at 4 bytes.
        let mut header_len = 1;
        loop {
            read_exact(conn, &mut self.in_buf[header_len..header_len + 1], true)?;
            header_len += 1;
            if self.in_buf[header_len - 1] & 0x80 == 0 {
                break;
            }
            if header_len == 5 {
                return Err(Error::DecodeTruncated);
            }
        }
        let (remaining, _) = codec::remaining_length(&self.in_buf[..header_len])?;

        // Body, as much as the read buffer holds; an oversized publish pulls
        // the rest through deliver_publish.
        let body_now = remaining.min(BUF - header_len);
        read_exact(conn, &mut self.in_buf[header_len..header_len + body_now], true)?;

        self.dispatch(header_len + body_now, remaining, header_len)?;
        Ok(true)
    }

    fn dispatch(&mut self, have: usize, remaining: usize, header_len: usize) -> Result<(), Error> {
        let kind =
            codec::packet_type(&self.in_buf[..have]).ok_or(Error::UnexpectedPacketType)?;
        debug!("dispatch {:?}, {} bytes", kind, header_len + remaining);
        match kind {
            PacketType::Suback => {
                let id = codec::packet_id(&self.in_buf[..have]).ok_or(Error::DecodeTruncated)?;
                if self.take_pending(PacketType::Subscribe, id) {
                    info!("subscribe acknowledged, id {}", id);
                    self.callbacks.subscribed(id);
                } else {
                    warn!("suback id {} matches no pending request", id);
                }
            }
            PacketType::Unsuback => {
                let id = codec::packet_id(&self.in_buf[..have]).ok_or(Error::DecodeTruncated)?;
                if self.take_pending(PacketType::Unsubscribe, id) {
                    info!("unsubscribe acknowledged, id {}", id);
                } else {
                    warn!("unsuback id {} matches no pending request", id);
                }
            }
            PacketType::Publish => self.deliver_publish(have, remaining, header_len)?,
            PacketType::Puback => {
                let id = codec::packet_id(&self.in_buf[..have]).ok_or(Error::DecodeTruncated)?;
                if self.take_pending(PacketType::Publish, id) {
                    info!("puback received, QoS 1 publish {} complete", id);
                    self.callbacks.published(id);
                } else {
                    warn!("puback id {} matches no pending publish", id);
                }
            }
            PacketType::Pubrec => {
                let id = codec::packet_id(&self.in_buf[..have]).ok_or(Error::DecodeTruncated)?;
                let frame = packet::ack(&mut self.out_buf, PacketType::Pubrel, id)?;
                self.queue.push(frame)?;
            }
            PacketType::Pubrel => {
                let id = codec::packet_id(&self.in_buf[..have]).ok_or(Error::DecodeTruncated)?;
                let frame = packet::ack(&mut self.out_buf, PacketType::Pubcomp, id)?;
                self.queue.push(frame)?;
            }
            PacketType::Pubcomp => {
                let id = codec::packet_id(&self.in_buf[..have]).ok_or(Error::DecodeTruncated)?;
                if self.take_pending(PacketType::Publish, id) {
                    info!("pubcomp received, QoS 2 publish {} complete", id);
                    self.callbacks.published(id);
                } else {
                    warn!("pubcomp id {} matches no pending publish", id);
                }
            }
            PacketType::Pingreq => {
                let frame = packet::pingresp(&mut self.out_buf)?;
                self.queue.push(frame)?;
            }
            PacketType::Pingresp => {
                debug!("pingresp received");
                self.keepalive_left = self.keepalive_window();
            }
            PacketType::Connack
            | PacketType::Connect
            | PacketType::Subscribe
            | PacketType::Unsubscribe
            | PacketType::Disconnect => {
                warn!("unexpected {:?} while connected", kind);
                return Err(Error::UnexpectedPacketType);
            }
        }
        Ok(())
    }

    fn deliver_publish(
        &mut self,
        have: usize,
        remaining: usize,
        header_len: usize,
    ) -> Result<(), Error> {
        let qos = codec::qos(&self.in_buf[..have]).ok_or(Error::DecodeTruncated)?;

        // Stage the acknowledgment before delivery.
        match qos {
            QoS::AtLeastOnce => {
                let id = codec::packet_id(&self.in_buf[..have]).ok_or(Error::DecodeTruncated)?;
                let frame = packet::ack(&mut self.out_buf, PacketType::Puback, id)?;
                self.queue.push(frame)?;
            }
            QoS::ExactlyOnce => {
                let id = codec::packet_id(&self.in_buf[..have]).ok_or(Error::DecodeTruncated)?;
                let frame = packet::ack(&mut self.out_buf, PacketType::Pubrec, id)?;
                self.queue.push(frame)?;
            }
            QoS::AtMostOnce => {}
        }

        // Topic and payload are slices into the read buffer, valid only
        // until the next read; the topic is copied out because delivery of
        // an oversized payload reads again before the last chunk lands.
        let topic_bytes =
            codec::publish_topic(&self.in_buf[..have]).ok_or(Error::DecodeTruncated)?;
        let topic_str =
            core::str::from_utf8(topic_bytes).map_err(|_| Error::DecodeTruncated)?;
        self.topic.clear();
        self.topic
            .push_str(topic_str)
            .map_err(|_| Error::DecodeTruncated)?;

        let payload_at =
            codec::publish_payload_offset(&self.in_buf[..have]).ok_or(Error::DecodeTruncated)?;
        let total = header_len + remaining - payload_at;
        let first = self
            .in_buf
            .get(payload_at..have)
            .ok_or(Error::DecodeTruncated)?;

        self.message_length = total;
        self.message_length_read = first.len();
        debug!(
            "publish received, topic {:?}, {}/{} bytes",
            &*self.topic,
            first.len(),
            total
        );
        self.callbacks.data(&self.topic, first, total, 0);

        // Oversized message: the remainder spans further reads, delivered
        // incrementally with offset bookkeeping.
        while self.message_length_read < self.message_length {
            let want = (self.message_length - self.message_length_read).min(BUF);
            let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
            let n = match conn.read(&mut self.in_buf[..want]) {
                Ok(0) => return Err(Error::Transport(ErrorKind::Closed)),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::TimedOut => continue,
                Err(e) => {
                    warn!("transport read failed mid-publish: {:?}", e);
                    return Err(Error::Transport(e.kind()));
                }
            };
            let offset = self.message_length_read;
            self.callbacks
                .data(&self.topic, &self.in_buf[..n], self.message_length, offset);
            self.message_length_read += n;
        }
        Ok(())
    }

    fn take_pending(&mut self, kind: PacketType, id: u16) -> bool {
        if self.pending == Some(Pending { kind, id }) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    fn warn_if_pending(&self) {
        if let Some(pending) = &self.pending {
            // One outstanding request at a time; a second one loses the
            // previous correlation.
            warn!(
                "request issued while {:?} id {} is still unacknowledged",
                pending.kind, pending.id
            );
        }
    }

    fn require_connected(&self) -> Result<(), Error> {
        if self.state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Send DISCONNECT and shut the session down for good.
    ///
    /// Staged frames are dropped, not drained; the queue is sealed so later
    /// stage attempts fail with [`Error::QueueClosed`] until a new
    /// [`connect`](Self::connect).
    pub fn disconnect(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Ok(frame) = packet::disconnect(&mut self.out_buf) {
                let _ = write_all(&mut conn, frame);
            }
            let _ = conn.close();
        }
        self.queue.close();
        self.finish_teardown();
    }

    /// Drop the transport after a failure. Fires the `disconnected` callback
    /// when a live session went down; the queue stays usable for the next
    /// connect.
    pub fn teardown(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = conn.close();
        }
        self.finish_teardown();
    }

    fn finish_teardown(&mut self) {
        let was_connected = self.state == ConnectionState::Connected;
        self.state = ConnectionState::Disconnected;
        self.pending = None;
        self.queue.clear();
        if was_connected {
            self.callbacks.disconnected();
        }
    }
}

impl<C, E, const BUF: usize, const QUEUE: usize, const FRAMES: usize> core::fmt::Debug
    for Session<'_, C, E, BUF, QUEUE, FRAMES>
where
    C: Connection,
    E: ClientCallbacks,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("pending", &self.pending)
            .field("queued_bytes", &self.queue.len())
            .field("keepalive_left", &self.keepalive_left)
            .field("message_length", &self.message_length)
            .field("message_length_read", &self.message_length_read)
            .finish_non_exhaustive()
    }
}

fn write_all<C: Connection>(conn: &mut C, mut bytes: &[u8]) -> Result<(), Error> {
    while !bytes.is_empty() {
        match conn.write(bytes) {
            Ok(0) => return Err(Error::Transport(ErrorKind::Closed)),
            Ok(n) => bytes = &bytes[n..],
            Err(e) => {
                warn!("transport write failed: {:?}", e);
                return Err(Error::Transport(e.kind()));
            }
        }
    }
    conn.flush().map_err(|e| {
        warn!("transport flush failed: {:?}", e);
        Error::Transport(e.kind())
    })
}

fn read_exact<C: Connection>(
    conn: &mut C,
    buf: &mut [u8],
    retry_on_timeout: bool,
) -> Result<(), Error> {
    let mut at = 0;
    while at < buf.len() {
        match conn.read(&mut buf[at..]) {
            Ok(0) => return Err(Error::Transport(ErrorKind::Closed)),
            Ok(n) => at += n,
            Err(e) if retry_on_timeout && e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => {
                warn!("transport read failed: {:?}", e);
                return Err(Error::Transport(e.kind()));
            }
        }
    }
    Ok(())
}
