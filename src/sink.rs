//! Glue binding a push-only byte source to the provider/reader pair.

use std::path::PathBuf;
use std::sync::Arc;

use crate::distributor::{DataDistributor, ErrorFlag};
use crate::provider::{ProviderConfig, StreamingDataProvider};
use crate::reader::Reader;
use crate::stop::StopToken;

/// Adapts a push-style byte source (an HTTP response body consumer,
/// typically) to the streaming extraction pipeline: fed bytes are buffered
/// by a [`StreamingDataProvider`] and decoded on a background thread, with
/// decoded entries materialized under the target directory by a
/// [`DataDistributor`].
pub struct TarExtractorSink {
    stop_token: StopToken,
    provider: Arc<StreamingDataProvider>,
    error_flag: ErrorFlag,
    reader: Reader,
    started: bool,
    finalized: bool,
}

impl TarExtractorSink {
    pub fn new(target_directory: impl Into<PathBuf>) -> Self {
        Self::with_config(target_directory, ProviderConfig::default())
    }

    pub fn with_config(target_directory: impl Into<PathBuf>, config: ProviderConfig) -> Self {
        let stop_token = StopToken::new();
        let provider = Arc::new(StreamingDataProvider::with_config(
            stop_token.clone(),
            config,
        ));
        let distributor = DataDistributor::new(target_directory);
        let error_flag = distributor.error_flag();
        let reader = Reader::new(provider.clone(), Box::new(distributor));
        TarExtractorSink {
            stop_token,
            provider,
            error_flag,
            reader,
            started: false,
            finalized: false,
        }
    }

    /// Feed the next block of downloaded bytes. The decode thread starts
    /// on the first call, exactly once. Returns the provider's push
    /// verdict (see [`StreamingDataProvider::push`]).
    pub fn feed(&mut self, buffer: &[u8]) -> bool {
        if !self.started {
            self.started = true;
            self.reader.read_async(self.stop_token.clone());
        }
        self.provider.push(buffer)
    }

    /// Signal end-of-stream and block until the decode thread has joined.
    /// Safe to call more than once.
    pub fn finalize(&mut self) {
        self.stop_token.signal();
        self.reader.await_read();
        self.finalized = true;
    }

    /// Whether the filesystem sink latched an extraction failure. Meaningful
    /// after [`TarExtractorSink::finalize`].
    pub fn is_in_error_state(&self) -> bool {
        self.error_flag.is_set()
    }

    /// Total bytes ever fed, for progress reporting.
    pub fn processed_byte_amount(&self) -> u64 {
        self.provider.processed_byte_amount()
    }
}

impl Drop for TarExtractorSink {
    fn drop(&mut self) {
        // Safety net: without the signal the decode thread would wait out
        // the full underrun limit before the reader joins.
        if !self.finalized {
            self.stop_token.signal();
        }
    }
}
