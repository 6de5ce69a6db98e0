//! Asynchronous archive reader.
//!
//! [`Reader`] drives the pull-based decode loop on a dedicated thread,
//! translating codec events into [`DataReceiver`] callbacks. The read is
//! cancellable from two independent directions: the internal stop flag set
//! by [`Reader::await_read`] (trips immediately) and an external
//! [`StopToken`] (trips after a grace timeout, giving in-flight consumers a
//! bounded window to wind down).

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::entry::Entry;
use crate::error::ArchiveError;
use crate::provider::{ChunkReader, DataProvider};
use crate::stop::StopToken;

/// Transfer buffer size for entry data.
pub const COPY_BUFFER_SIZE: usize = 4096;
/// Default grace granted to external consumers after the stop token fires.
pub const EXTERNAL_STOP_REQUESTED_TIMEOUT: Duration = Duration::from_secs(30);

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Receives decode lifecycle events from the reader thread.
///
/// For a given entry, zero or more `on_data` calls occur strictly between
/// its `on_new_entry` and `on_entry_complete`; exactly one of
/// `on_complete`, `on_error` or `on_abort` terminates the stream, and no
/// entry lifecycle events follow an error or abort. All methods default to
/// no-ops so implementations override only what they react to.
pub trait DataReceiver {
    /// A new file/directory/... was encountered in the archive.
    fn on_new_entry(&mut self, _entry: &Entry) {}

    /// Data belonging to the previously announced entry.
    fn on_data(&mut self, _data: &[u8]) {}

    /// The current entry completed.
    fn on_entry_complete(&mut self) {}

    /// The entire archive was read.
    fn on_complete(&mut self) {}

    /// The read failed; no further entries will be processed.
    fn on_error(&mut self, _error: &ArchiveError) {}

    /// The read was cancelled.
    fn on_abort(&mut self) {}
}

/// Asynchronously decodes a streaming tar archive.
pub struct Reader {
    provider: Option<Arc<dyn DataProvider + Send + Sync>>,
    receiver: Option<Box<dyn DataReceiver + Send>>,
    decode_thread: Option<JoinHandle<()>>,
    internal_stop: Arc<AtomicBool>,
}

impl Reader {
    pub fn new(
        provider: Arc<dyn DataProvider + Send + Sync>,
        receiver: Box<dyn DataReceiver + Send>,
    ) -> Self {
        Reader {
            provider: Some(provider),
            receiver: Some(receiver),
            decode_thread: None,
            internal_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the decode thread with the default external-stop grace.
    pub fn read_async(&mut self, external_stop_token: StopToken) {
        self.read_async_with_timeout(external_stop_token, EXTERNAL_STOP_REQUESTED_TIMEOUT);
    }

    /// Start the decode thread. `stop_token_timeout` is the grace window
    /// between the token firing and the read actually stopping. A `Reader`
    /// drives at most one read; further calls are no-ops.
    pub fn read_async_with_timeout(
        &mut self,
        external_stop_token: StopToken,
        stop_token_timeout: Duration,
    ) {
        let (Some(provider), Some(receiver)) = (self.provider.take(), self.receiver.take())
        else {
            return;
        };
        let internal_stop = Arc::clone(&self.internal_stop);
        self.decode_thread = Some(thread::spawn(move || {
            // The codec pulls bytes while opening already, so the whole
            // open/decode sequence has to live on this thread.
            provider.initialize();
            run_decode_loop(
                &provider,
                receiver,
                external_stop_token,
                stop_token_timeout,
                internal_stop,
            );
            provider.finalize();
        }));
    }

    /// Request a stop and block until the decode thread has finished.
    pub fn await_read(&mut self) {
        self.internal_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.decode_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.await_read();
    }
}

/// Combined stop condition of the decode loop. Emits the abort event
/// exactly once, the instant the condition first evaluates true.
struct StopCheck {
    internal_stop: Arc<AtomicBool>,
    external_stop_token: StopToken,
    stop_token_timeout: Duration,
    external_stop_requested: Option<Instant>,
    tripped: bool,
}

impl StopCheck {
    fn new(
        internal_stop: Arc<AtomicBool>,
        external_stop_token: StopToken,
        stop_token_timeout: Duration,
    ) -> Self {
        StopCheck {
            internal_stop,
            external_stop_token,
            stop_token_timeout,
            external_stop_requested: None,
            tripped: false,
        }
    }

    fn shall_stop(&mut self, receiver: &mut dyn DataReceiver) -> bool {
        if self.external_stop_requested.is_none() && self.external_stop_token.is_signaled() {
            self.external_stop_requested = Some(Instant::now());
        }
        let shall = self.internal_stop.load(Ordering::SeqCst)
            || self
                .external_stop_requested
                .is_some_and(|at| at.elapsed() >= self.stop_token_timeout);
        if shall && !self.tripped {
            tracing::debug!("archive read aborted");
            receiver.on_abort();
            self.tripped = true;
        }
        shall
    }
}

fn run_decode_loop(
    provider: &Arc<dyn DataProvider + Send + Sync>,
    mut receiver: Box<dyn DataReceiver + Send>,
    external_stop_token: StopToken,
    stop_token_timeout: Duration,
    internal_stop: Arc<AtomicBool>,
) {
    let mut stop = StopCheck::new(internal_stop, external_stop_token, stop_token_timeout);

    let stream = match open_codec_stream(Arc::clone(provider)) {
        Ok(stream) => stream,
        Err(err) => {
            receiver.on_error(&ArchiveError::codec_context(err, "opening archive"));
            return;
        }
    };
    let mut archive = Archive::new(stream);
    let mut entries = match archive.entries() {
        Ok(entries) => entries,
        Err(err) => {
            receiver.on_error(&ArchiveError::codec_context(err, "opening archive"));
            return;
        }
    };

    let mut buffer = [0u8; COPY_BUFFER_SIZE];
    loop {
        if stop.shall_stop(receiver.as_mut()) {
            break;
        }
        let mut codec_entry = match entries.next() {
            None => {
                receiver.on_complete();
                break;
            }
            Some(Ok(codec_entry)) => codec_entry,
            Some(Err(err)) => {
                receiver.on_error(&ArchiveError::codec_context(err, "reading entry header"));
                return;
            }
        };

        let entry = match Entry::from_codec(&codec_entry) {
            Ok(entry) => entry,
            Err(err) => {
                receiver.on_error(&err);
                return;
            }
        };
        receiver.on_new_entry(&entry);

        loop {
            let amount = match codec_entry.read(&mut buffer) {
                Ok(amount) => amount,
                // The codec's "retry" signal; not an error.
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    receiver.on_error(&ArchiveError::codec_context(err, "reading entry data"));
                    return;
                }
            };
            if amount > 0 {
                receiver.on_data(&buffer[..amount]);
            }
            if stop.shall_stop(receiver.as_mut()) || amount == 0 {
                break;
            }
        }

        if stop.tripped {
            // The entry is abandoned mid-stream; no completion event.
            break;
        }
        receiver.on_entry_complete();
    }
}

/// Wrap the provider in the codec's byte stream, transparently decoding a
/// gzip filter when the leading magic bytes announce one.
fn open_codec_stream(
    provider: Arc<dyn DataProvider + Send + Sync>,
) -> io::Result<Box<dyn Read + Send>> {
    let mut raw = ChunkReader::new(provider);
    let mut magic = [0u8; 2];
    let mut filled = 0;
    while filled < magic.len() {
        let amount = raw.read(&mut magic[filled..])?;
        if amount == 0 {
            break;
        }
        filled += amount;
    }
    let replay = io::Cursor::new(magic[..filled].to_vec());
    let stream = replay.chain(raw);
    if filled == magic.len() && magic == GZIP_MAGIC {
        Ok(Box::new(GzDecoder::new(stream)))
    } else {
        Ok(Box::new(stream))
    }
}
