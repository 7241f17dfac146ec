//! The supervisory connect/dispatch loop.
//!
//! Two logical units of concurrency keep a session alive: receive-dispatch
//! and send/keepalive. [`Runner`] schedules them cooperatively on one
//! driver: the connected-phase read timeout is the scheduling quantum. Each
//! cycle drains everything staged, then dispatches at most one inbound
//! packet (or times out idle and advances the keepalive countdown). An ack
//! staged by dispatch leaves on the very next cycle, so a blocked read never
//! starves the send side.
//!
//! On any reconnect-worthy failure the transport is torn down, staged bytes
//! are dropped, and the loop retries `connect` after a fixed backoff,
//! indefinitely, including on permanent refusals such as bad credentials.

use log::{info, warn};

use crate::error::Error;
use crate::network::error::ErrorKind;
use crate::network::{Connect, Delay};
use crate::session::{ClientCallbacks, Session};

/// Fixed delay between reconnect attempts.
const RECONNECT_BACKOFF_MS: u32 = 1_000;

/// Connected-phase read timeout: the cooperative scheduling quantum.
const IDLE_QUANTUM_SECS: u16 = 1;

/// Owns the transport connector and drives a [`Session`] forever.
pub struct Runner<T: Connect, D: Delay> {
    connector: T,
    delay: D,
}

impl<T: Connect, D: Delay> Runner<T, D> {
    /// A runner over the given connector and delay source.
    pub fn new(connector: T, delay: D) -> Self {
        Self { connector, delay }
    }

    /// One connect-and-drive cycle: dial the broker, handshake, re-establish
    /// the configured subscription, then alternate send drain and receive
    /// dispatch until the connection fails.
    ///
    /// Only returns on failure; the error says why the cycle ended.
    pub fn run_once<E, const BUF: usize, const QUEUE: usize, const FRAMES: usize>(
        &mut self,
        session: &mut Session<'_, T::Connection, E, BUF, QUEUE, FRAMES>,
    ) -> Result<(), Error>
    where
        E: ClientCallbacks,
    {
        let remote = session.config().remote_addr();
        let conn = match self.connector.connect(&remote) {
            Ok(conn) => conn,
            Err(e) => {
                warn!("transport connect to {} failed: {:?}", &*remote, e);
                return Err(Error::Transport(ErrorKind::Other));
            }
        };
        session.connect(conn)?;

        if let Some(filter) = session.config().subscribe_filter {
            let qos = session.config().subscribe_qos;
            session.subscribe(filter, qos)?;
        }

        session.set_read_timeout(Some(IDLE_QUANTUM_SECS))?;
        loop {
            session.service_send()?;
            match session.poll() {
                Ok(true) => {}
                Ok(false) => session.tick()?,
                Err(e) if e.requires_reconnect() => return Err(e),
                Err(e) => warn!("dropped a malformed packet: {:?}", e),
            }
        }
    }

    /// Drive the session indefinitely, reconnecting with a fixed 1-second
    /// backoff whenever the connection is lost.
    pub fn run<E, const BUF: usize, const QUEUE: usize, const FRAMES: usize>(
        &mut self,
        session: &mut Session<'_, T::Connection, E, BUF, QUEUE, FRAMES>,
    ) -> !
    where
        E: ClientCallbacks,
    {
        loop {
            if let Err(e) = self.run_once(session) {
                info!("session ended: {:?}", e);
            }
            session.teardown();
            self.delay.delay_ms(RECONNECT_BACKOFF_MS);
        }
    }
}

impl<T: Connect, D: Delay> core::fmt::Debug for Runner<T, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runner").finish_non_exhaustive()
    }
}
