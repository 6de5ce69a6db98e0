//! # tarpipe
//!
//! Streaming tar extraction over a push-fed byte source, plus the matching
//! synchronous writer.
//!
//! The read side bridges a push-style byte producer (an HTTP download in
//! progress, say) and the pull-based tar codec: bytes are buffered by a
//! bounded, backpressure-aware queue and decoded on a background thread
//! that dispatches entry lifecycle events to a receiver.
//!
//! ## Key Modules
//!
//! - [`provider`]: the bounded chunk buffer between producer and decoder.
//! - [`reader`]: the asynchronous decode loop and its receiver interface.
//! - [`distributor`]: a receiver that extracts entries to the filesystem.
//! - [`writer`]: synchronous tar creation, to disk or memory.
//! - [`sink`]: ties provider, reader and distributor into one push target.
//!
//! ## Example
//!
//! ```no_run
//! use tarpipe::TarExtractorSink;
//!
//! let mut sink = TarExtractorSink::new("/tmp/out");
//! // Call feed() with each downloaded block, then:
//! sink.feed(b"...");
//! sink.finalize();
//! assert!(!sink.is_in_error_state());
//! ```

pub mod distributor;
pub mod entry;
pub mod error;
pub mod provider;
pub mod reader;
pub mod sink;
pub mod stop;
pub mod writer;

pub use distributor::{DataDistributor, ErrorFlag};
pub use entry::{Entry, EntryType};
pub use error::{ArchiveError, Result};
pub use provider::{DataProvider, ProviderConfig, StreamingDataProvider};
pub use reader::{DataReceiver, Reader};
pub use sink::TarExtractorSink;
pub use stop::StopToken;
pub use writer::{MemoryBuffer, Writer};
