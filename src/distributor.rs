//! Filesystem sink for decoded archive entries.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::error;

use crate::entry::{Entry, EntryType};
use crate::error::ArchiveError;
use crate::reader::DataReceiver;

/// Clonable view of a [`DataDistributor`]'s latched error state, for the
/// glue code that moves the distributor into a reader but still needs to
/// learn whether extraction failed.
#[derive(Clone)]
pub struct ErrorFlag(Arc<AtomicBool>);

impl ErrorFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Materializes decoded entries (directories, regular files) under a base
/// path, streaming entry bytes into the currently open file.
///
/// The first sink failure latches an error state; from then on every
/// callback is silently dropped. The reader keeps running, the extraction
/// result is reported through [`DataDistributor::is_in_error_state`].
pub struct DataDistributor {
    base_path: PathBuf,
    current_file: Option<File>,
    error_state: Arc<AtomicBool>,
}

impl DataDistributor {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        DataDistributor {
            base_path: base_path.into(),
            current_file: None,
            error_state: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if the error flag was set by a failed open/write or by the
    /// reader's error event.
    pub fn is_in_error_state(&self) -> bool {
        self.error_state.load(Ordering::SeqCst)
    }

    /// A handle onto the error latch that stays valid after the
    /// distributor moves into the reader thread.
    pub fn error_flag(&self) -> ErrorFlag {
        ErrorFlag(Arc::clone(&self.error_state))
    }

    fn enter_error_state(&mut self) {
        self.error_state.store(true, Ordering::SeqCst);
    }
}

impl DataReceiver for DataDistributor {
    fn on_new_entry(&mut self, entry: &Entry) {
        if self.is_in_error_state() {
            return;
        }

        let target = resolve_target(&self.base_path, entry.pathname());
        match entry.entry_type() {
            EntryType::Directory => {
                // Non-recursive; a pre-existing directory is fine.
                if let Err(err) = fs::create_dir(&target) {
                    if err.kind() != io::ErrorKind::AlreadyExists {
                        error!(path = %target.display(), %err, "failed to create directory");
                        self.enter_error_state();
                    }
                }
            }
            EntryType::RegularFile => match File::create(&target) {
                Ok(file) => self.current_file = Some(file),
                Err(err) => {
                    error!(path = %target.display(), %err, "failed to open destination file");
                    self.enter_error_state();
                }
            },
            _ => {}
        }
    }

    fn on_data(&mut self, data: &[u8]) {
        if self.is_in_error_state() {
            return;
        }

        match self.current_file.as_mut() {
            Some(file) => {
                if let Err(err) = file.write_all(data) {
                    error!(%err, "failed to write entry data");
                    self.enter_error_state();
                }
            }
            None => self.enter_error_state(),
        }
    }

    fn on_entry_complete(&mut self) {
        // Idempotent if nothing is open.
        self.current_file = None;
    }

    fn on_error(&mut self, error: &ArchiveError) {
        error!(%error, "extraction failed");
        self.enter_error_state();
        self.current_file = None;
    }
}

/// Resolve an entry's relative path against the base, normalizing "." and
/// ".." segments lexically. ".." never pops past the base, so resolved
/// targets always stay inside it.
fn resolve_target(base: &Path, relative: &Path) -> PathBuf {
    let mut target = base.to_path_buf();
    let mut depth = 0usize;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                target.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth > 0 {
                    target.pop();
                    depth -= 1;
                }
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    target
}
