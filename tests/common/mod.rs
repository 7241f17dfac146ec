//! Shared test doubles: a scripted mock transport and an event-recording
//! callback set.

// not every test binary uses every helper
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use libmqtt::network::error::Error as NetError;
use libmqtt::network::{Close, Connect, Connection, Delay, Read, SetReadTimeout, Write};
use libmqtt::session::ClientCallbacks;

/// One scripted step of the mock transport's read side.
#[derive(Debug, Clone)]
pub enum Step {
    /// Bytes the "broker" sends.
    Bytes(Vec<u8>),
    /// A read timeout (idle cycle).
    Timeout,
}

/// A scripted connection: reads come from the script, writes are captured.
#[derive(Debug, Default)]
pub struct MockConnection {
    script: VecDeque<Step>,
    cursor: VecDeque<u8>,
    pub written: Rc<RefCell<Vec<u8>>>,
    pub timeouts: Rc<RefCell<Vec<Option<u16>>>>,
}

impl MockConnection {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    /// Handles that stay observable after the session takes ownership.
    pub fn taps(&self) -> (Rc<RefCell<Vec<u8>>>, Rc<RefCell<Vec<Option<u16>>>>) {
        (Rc::clone(&self.written), Rc::clone(&self.timeouts))
    }
}

impl Read for MockConnection {
    type Error = NetError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        loop {
            if !self.cursor.is_empty() {
                let n = buf.len().min(self.cursor.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = self.cursor.pop_front().unwrap();
                }
                return Ok(n);
            }
            match self.script.pop_front() {
                Some(Step::Bytes(bytes)) => self.cursor.extend(bytes),
                Some(Step::Timeout) => return Err(NetError::Timeout),
                // script exhausted: orderly close
                None => return Ok(0),
            }
        }
    }
}

impl Write for MockConnection {
    type Error = NetError;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.written.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for MockConnection {
    type Error = NetError;

    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl SetReadTimeout for MockConnection {
    type Error = NetError;

    fn set_read_timeout(&mut self, seconds: Option<u16>) -> Result<(), Self::Error> {
        self.timeouts.borrow_mut().push(seconds);
        Ok(())
    }
}

impl Connection for MockConnection {}

/// Everything the session reported through its callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected,
    Disconnected,
    Reconnected,
    Subscribed(u16),
    Published(u16),
    Data {
        topic: String,
        payload: Vec<u8>,
        total: usize,
        offset: usize,
    },
}

/// Callback set that records every invocation.
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Rc<RefCell<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> (Self, Rc<RefCell<Vec<Event>>>) {
        let recorder = Self::default();
        let events = Rc::clone(&recorder.events);
        (recorder, events)
    }
}

impl ClientCallbacks for Recorder {
    fn connected(&mut self) {
        self.events.borrow_mut().push(Event::Connected);
    }

    fn disconnected(&mut self) {
        self.events.borrow_mut().push(Event::Disconnected);
    }

    fn reconnected(&mut self) {
        self.events.borrow_mut().push(Event::Reconnected);
    }

    fn subscribed(&mut self, id: u16) {
        self.events.borrow_mut().push(Event::Subscribed(id));
    }

    fn published(&mut self, id: u16) {
        self.events.borrow_mut().push(Event::Published(id));
    }

    fn data(&mut self, topic: &str, payload: &[u8], total_len: usize, offset: usize) {
        self.events.borrow_mut().push(Event::Data {
            topic: topic.to_owned(),
            payload: payload.to_vec(),
            total: total_len,
            offset,
        });
    }
}

/// Connector handing out pre-scripted connections in order.
#[derive(Debug, Default)]
pub struct MockConnector {
    pub connections: VecDeque<MockConnection>,
}

impl Connect for MockConnector {
    type Connection = MockConnection;
    type Error = NetError;

    fn connect(&mut self, _remote: &str) -> Result<Self::Connection, Self::Error> {
        self.connections.pop_front().ok_or(NetError::ConnectionRefused)
    }
}

/// Observation handles into a session's connection and callbacks.
#[derive(Debug)]
pub struct Taps {
    pub written: Rc<RefCell<Vec<u8>>>,
    pub timeouts: Rc<RefCell<Vec<Option<u16>>>>,
    pub events: Rc<RefCell<Vec<Event>>>,
}

/// A delay source that does not sleep.
#[derive(Debug, Default)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn delay_ms(&mut self, _ms: u32) {}
}

/// A CONNACK accepting the connection.
pub fn connack_accepted() -> Vec<u8> {
    vec![0x20, 0x02, 0x00, 0x00]
}

/// A CONNACK refusing with the given return code.
pub fn connack_refused(code: u8) -> Vec<u8> {
    vec![0x20, 0x02, 0x00, code]
}

/// A SUBACK for the given message id (granted QoS 0).
pub fn suback(id: u16) -> Vec<u8> {
    let [hi, lo] = id.to_be_bytes();
    vec![0x90, 0x03, hi, lo, 0x00]
}

/// A 4-byte acknowledgment frame of the given type nibble/flags byte.
pub fn ack_frame(first: u8, id: u16) -> Vec<u8> {
    let [hi, lo] = id.to_be_bytes();
    vec![first, 0x02, hi, lo]
}

/// An inbound PUBLISH frame as a broker would send it.
pub fn inbound_publish(topic: &str, payload: &[u8], qos: u8, id: Option<u16>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    body.extend_from_slice(topic.as_bytes());
    if let Some(id) = id {
        body.extend_from_slice(&id.to_be_bytes());
    }
    body.extend_from_slice(payload);

    let mut frame = vec![0x30 | (qos << 1)];
    let mut remaining = body.len();
    loop {
        let mut byte = (remaining % 128) as u8;
        remaining /= 128;
        if remaining > 0 {
            byte |= 0x80;
        }
        frame.push(byte);
        if remaining == 0 {
            break;
        }
    }
    frame.extend_from_slice(&body);
    frame
}
