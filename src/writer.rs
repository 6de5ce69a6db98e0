//! Synchronous tar writer, to a file on disk or an in-memory buffer.

use std::fs::File;
use std::io::{self, Write};
use std::mem;
use std::path::Path;
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder;

use crate::entry::{Entry, EntryType};
use crate::error::{ArchiveError, Result};

/// Shared growable buffer for in-memory archive output. The writer appends
/// to it; the owner reads it back after [`Writer::finish`].
pub type MemoryBuffer = Arc<Mutex<Vec<u8>>>;

/// Destination stream of the archive, optionally gzip-filtered.
enum Output {
    Plain(Box<dyn Write + Send>),
    Gzip(GzEncoder<Box<dyn Write + Send>>),
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Plain(inner) => inner.write(buf),
            Output::Gzip(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Plain(inner) => inner.flush(),
            Output::Gzip(inner) => inner.flush(),
        }
    }
}

impl Output {
    fn finish(self) -> io::Result<()> {
        match self {
            Output::Plain(mut inner) => inner.flush(),
            Output::Gzip(inner) => inner.finish()?.flush(),
        }
    }
}

/// `Write` adapter appending to a [`MemoryBuffer`].
struct SharedBuffer(MemoryBuffer);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum State {
    /// Destination open, no entries written yet. Filters can still be added.
    Open(Output),
    /// At least one entry header has been committed.
    Writing(Builder<Output>),
    Finished,
}

/// Creates a tar archive, entry by entry.
///
/// Entries are whole files ([`Writer::add_file`]) or in-memory strings
/// ([`Writer::add_string`]). A header-write failure short-circuits before
/// any data is streamed; a data-write failure aborts the current entry but
/// earlier entries stay intact — callers should treat the whole archive as
/// failed in that case, tar has no partial rollback.
pub struct Writer {
    state: State,
}

impl Writer {
    /// Write the archive to a file in the filesystem. Fails right away if
    /// the destination cannot be opened.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_output(Output::Plain(Box::new(file))))
    }

    /// Write the archive into the supplied shared buffer.
    pub fn to_memory(buffer: MemoryBuffer) -> Self {
        Self::from_output(Output::Plain(Box::new(SharedBuffer(buffer))))
    }

    fn from_output(output: Output) -> Self {
        Writer {
            state: State::Open(output),
        }
    }

    /// Compress all subsequently written entries with gzip. Rejected once
    /// an entry has been written or when a filter is already present.
    pub fn add_gzip_filter(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, State::Finished) {
            State::Open(Output::Plain(inner)) => {
                self.state = State::Open(Output::Gzip(GzEncoder::new(
                    inner,
                    Compression::default(),
                )));
                Ok(())
            }
            state @ State::Open(Output::Gzip(_)) => {
                self.state = state;
                Err(ArchiveError::FilterRejected(
                    "gzip filter already present".into(),
                ))
            }
            state => {
                self.state = state;
                Err(ArchiveError::FilterRejected(
                    "entries were already written".into(),
                ))
            }
        }
    }

    /// Add a file (or directory) from the filesystem. The entry is named
    /// after the path's final component.
    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        let mut entry = Entry::default();
        entry.populate_from_filesystem(path)?;
        let mut header = entry.to_tar_header();

        if entry.entry_type() == EntryType::RegularFile {
            let file = File::open(path)?;
            self.builder()?
                .append_data(&mut header, entry.pathname(), file)
                .map_err(|e| ArchiveError::codec_context(e, "writing entry"))?;
        } else {
            self.builder()?
                .append_data(&mut header, entry.pathname(), io::empty())
                .map_err(|e| ArchiveError::codec_context(e, "writing entry"))?;
        }
        Ok(())
    }

    /// Add an in-memory string as a regular-file entry.
    pub fn add_string(&mut self, data: &str, path_name: &Path, permissions: u32) -> Result<()> {
        let mut entry = Entry::default();
        entry.set_pathname(path_name);
        entry.set_size(data.len() as u64);
        entry.set_entry_type(EntryType::RegularFile);
        entry.set_permissions(permissions);
        let mut header = entry.to_tar_header();

        self.builder()?
            .append_data(&mut header, entry.pathname(), data.as_bytes())
            .map_err(|e| ArchiveError::codec_context(e, "writing entry"))?;
        Ok(())
    }

    /// Write the archive trailer and flush the gzip stream if present.
    /// Dropping the writer does the same on a best-effort basis.
    pub fn finish(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, State::Finished) {
            State::Open(output) => {
                // An archive with no entries still gets its trailer.
                Builder::new(output).into_inner()?.finish()?;
            }
            State::Writing(builder) => {
                builder.into_inner()?.finish()?;
            }
            State::Finished => {}
        }
        Ok(())
    }

    fn builder(&mut self) -> Result<&mut Builder<Output>> {
        if matches!(self.state, State::Open(_)) {
            if let State::Open(output) = mem::replace(&mut self.state, State::Finished) {
                self.state = State::Writing(Builder::new(output));
            }
        }
        match &mut self.state {
            State::Writing(builder) => Ok(builder),
            _ => Err(ArchiveError::codec("archive already finished")),
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
