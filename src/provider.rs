//! Pull-side data plumbing for the streaming reader.
//!
//! The decode loop pulls chunks through the [`DataProvider`] trait. The
//! built-in [`StreamingDataProvider`] decouples a push-style byte producer
//! (a download thread, typically) from that pull loop with a bounded FIFO,
//! backpressure timeouts and a cooperative stop condition.

use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError};

use crate::stop::StopToken;

/// Supplies raw bytes to the decode loop, pull based.
///
/// Implementations must be safe to call from the decode thread while other
/// threads feed them.
pub trait DataProvider {
    /// Called before the first bytes are read, can be used for setup.
    fn initialize(&self) {}

    /// Called when the archive was read completely.
    fn finalize(&self) {}

    /// Return the next block of data, or `None` for end-of-stream.
    fn read_chunk(&self) -> Option<Vec<u8>>;
}

/// Wait limit before an empty buffer is reported as end-of-stream.
pub const BUFFER_UNDERRUN_TIME_LIMIT: Duration = Duration::from_secs(60);
/// Wait limit before a push into a full buffer gives up.
pub const BUFFER_OVERFLOW_TIME_LIMIT: Duration = Duration::from_secs(60);
/// Delay between observing the stop token and hard-stopping, so buffered
/// data can finish draining.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(10);
/// Maximum number of chunks held in the buffer.
pub const MAX_BUFFER_CHUNKS: usize = 100;

/// Tunable limits for [`StreamingDataProvider`]. The three durations are
/// independent knobs; they are never backed by a shared timer.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub underrun_limit: Duration,
    pub overflow_limit: Duration,
    pub stop_grace_period: Duration,
    pub max_buffer_chunks: usize,
    /// Granularity of the blocking waits. Coarse by intention; only the
    /// total bounded wait is a contract.
    pub poll_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            underrun_limit: BUFFER_UNDERRUN_TIME_LIMIT,
            overflow_limit: BUFFER_OVERFLOW_TIME_LIMIT,
            stop_grace_period: STOP_GRACE_PERIOD,
            max_buffer_chunks: MAX_BUFFER_CHUNKS,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Thread-safe bounded queue of byte chunks between one producer thread and
/// the one decode thread.
///
/// Chunks come out in the exact order they were pushed. A full queue blocks
/// the producer (up to the overflow limit), an empty queue blocks the decode
/// thread (up to the underrun limit, after which it reads as end-of-stream).
/// Once the stop token is observed, the provider keeps serving buffered
/// chunks until the queue drains or the grace period elapses, whichever
/// comes first.
pub struct StreamingDataProvider {
    sender: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    stop_token: StopToken,
    /// Timestamp of the first stop-token observation. Kept under its own
    /// lock so stop checks do not contend with the data path.
    stop_detected: Mutex<Option<Instant>>,
    processed_bytes: AtomicU64,
    config: ProviderConfig,
}

impl StreamingDataProvider {
    pub fn new(stop_token: StopToken) -> Self {
        Self::with_config(stop_token, ProviderConfig::default())
    }

    pub fn with_config(stop_token: StopToken, config: ProviderConfig) -> Self {
        let (sender, receiver) = bounded(config.max_buffer_chunks);
        StreamingDataProvider {
            sender,
            receiver,
            stop_token,
            stop_detected: Mutex::new(None),
            processed_bytes: AtomicU64::new(0),
            config,
        }
    }

    /// Append a chunk, blocking while the queue is at capacity.
    ///
    /// Returns `false` if the overflow limit elapses without the queue
    /// draining or if the stop condition activates meanwhile, `true` once
    /// the chunk is enqueued.
    pub fn push(&self, chunk: impl Into<Vec<u8>>) -> bool {
        let mut chunk = chunk.into();
        let amount = chunk.len() as u64;
        let wait_started = Instant::now();
        loop {
            if self.shall_stop() {
                return false;
            }
            match self.sender.send_timeout(chunk, self.config.poll_interval) {
                Ok(()) => {
                    self.processed_bytes.fetch_add(amount, Ordering::Relaxed);
                    return true;
                }
                Err(SendTimeoutError::Timeout(returned)) => {
                    if wait_started.elapsed() >= self.config.overflow_limit {
                        tracing::warn!("buffer overflow limit reached, dropping push");
                        return false;
                    }
                    chunk = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    /// Monotonically increasing count of bytes ever pushed, for progress
    /// reporting. Safe to read from any thread.
    pub fn processed_byte_amount(&self) -> u64 {
        self.processed_bytes.load(Ordering::Relaxed)
    }

    /// The stop condition: the token has been observed as signaled and
    /// either the grace period elapsed since that first observation or the
    /// queue has fully drained.
    fn shall_stop(&self) -> bool {
        let mut detected = self.stop_detected.lock().unwrap();
        if detected.is_none() && self.stop_token.is_signaled() {
            *detected = Some(Instant::now());
        }
        match *detected {
            Some(at) => {
                at.elapsed() >= self.config.stop_grace_period || self.receiver.is_empty()
            }
            None => false,
        }
    }
}

impl DataProvider for StreamingDataProvider {
    fn read_chunk(&self) -> Option<Vec<u8>> {
        // Buffered data is drained even when a stop is already pending.
        match self.receiver.try_recv() {
            Ok(chunk) => return Some(chunk),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return None,
        }

        let wait_started = Instant::now();
        loop {
            if self.shall_stop() {
                return None;
            }
            match self.receiver.recv_timeout(self.config.poll_interval) {
                Ok(chunk) => return Some(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    if wait_started.elapsed() >= self.config.underrun_limit {
                        // Indistinguishable from a legitimate end-of-stream;
                        // the codec sees a truncated archive at worst.
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

/// Adapts a [`DataProvider`] to the byte-oriented interface the codec pulls
/// from, carrying partial-chunk leftovers between calls.
pub(crate) struct ChunkReader {
    provider: Arc<dyn DataProvider + Send + Sync>,
    pending: Vec<u8>,
    position: usize,
    eof: bool,
}

impl ChunkReader {
    pub(crate) fn new(provider: Arc<dyn DataProvider + Send + Sync>) -> Self {
        ChunkReader {
            provider,
            pending: Vec::new(),
            position: 0,
            eof: false,
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.position == self.pending.len() {
            if self.eof {
                return Ok(0);
            }
            match self.provider.read_chunk() {
                Some(chunk) if !chunk.is_empty() => {
                    self.pending = chunk;
                    self.position = 0;
                }
                // A zero-length result latches as end-of-stream.
                _ => {
                    self.eof = true;
                    return Ok(0);
                }
            }
        }
        let amount = (self.pending.len() - self.position).min(buf.len());
        buf[..amount].copy_from_slice(&self.pending[self.position..self.position + amount]);
        self.position += amount;
        Ok(amount)
    }
}
