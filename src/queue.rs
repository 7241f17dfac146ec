//! Outbound byte staging between the packet builders and the transport writer.
//!
//! A fixed-size circular byte buffer paired with a bounded deque of frame
//! lengths. The builder side pushes a finished frame; the writer side drains
//! it in chunks no larger than its own buffer. A full queue is an explicit
//! [`Error::QueueFull`] the producer can act on, not a spin loop.
//!
//! ```
//! use libmqtt::queue::OutboundQueue;
//!
//! let mut queue: OutboundQueue<16, 4> = OutboundQueue::new();
//! queue.push(&[0xC0, 0x00]).unwrap();
//! let mut out = [0u8; 16];
//! let (n, done) = queue.pop_chunk(&mut out).unwrap();
//! assert_eq!(&out[..n], [0xC0, 0x00]);
//! assert!(done);
//! ```

use heapless::Deque;

use crate::error::Error;

/// A single-producer/single-consumer byte pipe of `N` bytes staging up to
/// `M` frames.
pub struct OutboundQueue<const N: usize, const M: usize> {
    buf: [u8; N],
    read: usize,
    write: usize,
    fill: usize,
    lengths: Deque<u16, M>,
    head_taken: usize,
    closed: bool,
}

impl<const N: usize, const M: usize> OutboundQueue<N, M> {
    /// An empty, open queue.
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            read: 0,
            write: 0,
            fill: 0,
            lengths: Deque::new(),
            head_taken: 0,
            closed: false,
        }
    }

    /// Stage one finished frame.
    ///
    /// Fails with [`Error::QueueFull`] when the ring or the length deque has
    /// no room, and [`Error::QueueClosed`] after [`close`](Self::close).
    pub fn push(&mut self, frame: &[u8]) -> Result<(), Error> {
        if self.closed {
            return Err(Error::QueueClosed);
        }
        if frame.is_empty() {
            return Ok(());
        }
        if frame.len() > u16::MAX as usize
            || frame.len() > N - self.fill
            || self.lengths.is_full()
        {
            return Err(Error::QueueFull);
        }
        let first = (N - self.write).min(frame.len());
        self.buf[self.write..self.write + first].copy_from_slice(&frame[..first]);
        let rest = frame.len() - first;
        self.buf[..rest].copy_from_slice(&frame[first..]);
        self.write = (self.write + frame.len()) % N;
        self.fill += frame.len();
        // cannot fail: checked is_full above
        let _ = self.lengths.push_back(frame.len() as u16);
        Ok(())
    }

    /// Length of the frame at the head of the queue, if any.
    pub fn pending_frame(&self) -> Option<usize> {
        self.lengths.front().map(|&len| len as usize)
    }

    /// Whether the next [`pop_chunk`](Self::pop_chunk) starts a new frame
    /// (rather than continuing one already partially drained).
    pub fn at_frame_start(&self) -> bool {
        self.head_taken == 0
    }

    /// Copy out up to `out.len()` bytes of the head frame.
    ///
    /// Returns the byte count and whether the frame is now fully drained.
    /// `None` when the queue is empty or `out` has no room.
    pub fn pop_chunk(&mut self, out: &mut [u8]) -> Option<(usize, bool)> {
        if out.is_empty() {
            return None;
        }
        let len = *self.lengths.front()? as usize;
        let take = (len - self.head_taken).min(out.len());
        let first = (N - self.read).min(take);
        out[..first].copy_from_slice(&self.buf[self.read..self.read + first]);
        let rest = take - first;
        out[first..take].copy_from_slice(&self.buf[..rest]);
        self.read = (self.read + take) % N;
        self.fill -= take;
        self.head_taken += take;
        let done = self.head_taken == len;
        if done {
            self.lengths.pop_front();
            self.head_taken = 0;
        }
        Some((take, done))
    }

    /// Bytes currently staged.
    pub fn len(&self) -> usize {
        self.fill
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }

    /// Total byte capacity of the ring.
    pub fn capacity(&self) -> usize {
        N
    }

    /// Drop everything staged. Queued bytes are not drained on teardown.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.fill = 0;
        self.head_taken = 0;
        self.lengths.clear();
    }

    /// Seal the queue; further pushes fail with [`Error::QueueClosed`].
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Drop staged bytes and reopen after a close.
    pub fn reset(&mut self) {
        self.clear();
        self.closed = false;
    }
}

impl<const N: usize, const M: usize> Default for OutboundQueue<N, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const M: usize> core::fmt::Debug for OutboundQueue<N, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("fill", &self.fill)
            .field("frames", &self.lengths.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
