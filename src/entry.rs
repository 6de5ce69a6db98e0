//! Metadata of a single archive member.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};

/// File type of an archive member, mirroring the POSIX file type bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    RegularFile,
    SymbolicLink,
    Socket,
    CharacterDevice,
    BlockDevice,
    Directory,
    Pipe,
}

impl EntryType {
    pub(crate) fn from_tar(kind: tar::EntryType) -> Self {
        match kind {
            tar::EntryType::Directory => EntryType::Directory,
            tar::EntryType::Symlink => EntryType::SymbolicLink,
            tar::EntryType::Char => EntryType::CharacterDevice,
            tar::EntryType::Block => EntryType::BlockDevice,
            tar::EntryType::Fifo => EntryType::Pipe,
            // Regular, Continuous, hard links and the extension record
            // types all stream like regular files.
            _ => EntryType::RegularFile,
        }
    }

    pub(crate) fn to_tar(self) -> tar::EntryType {
        match self {
            EntryType::RegularFile => tar::EntryType::Regular,
            EntryType::SymbolicLink => tar::EntryType::Symlink,
            EntryType::CharacterDevice => tar::EntryType::Char,
            EntryType::BlockDevice => tar::EntryType::Block,
            EntryType::Directory => tar::EntryType::Directory,
            // The tar format has no socket representation.
            EntryType::Pipe | EntryType::Socket => tar::EntryType::Fifo,
        }
    }
}

/// One member (file/directory/...) of a tar archive.
///
/// An `Entry` is created fresh per archive member on the read side and
/// handed to the receiver by borrowed view; on the write side it is
/// populated explicitly (or from filesystem stat data) before its header
/// is committed to the codec.
#[derive(Debug, Clone)]
pub struct Entry {
    pathname: PathBuf,
    size: u64,
    entry_type: EntryType,
    permissions: u32,
    uid: u64,
    gid: u64,
}

impl Default for Entry {
    fn default() -> Self {
        Entry {
            pathname: PathBuf::new(),
            size: 0,
            entry_type: EntryType::RegularFile,
            permissions: 0o644,
            uid: 0,
            gid: 0,
        }
    }
}

impl Entry {
    pub fn pathname(&self) -> &Path {
        &self.pathname
    }

    pub fn set_pathname(&mut self, path: impl Into<PathBuf>) {
        self.pathname = path.into();
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    pub fn set_entry_type(&mut self, entry_type: EntryType) {
        self.entry_type = entry_type;
    }

    /// Classic unix permission bits, like 0o644, 0o755 etc.
    pub fn permissions(&self) -> u32 {
        self.permissions
    }

    pub fn set_permissions(&mut self, permissions: u32) {
        self.permissions = permissions;
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn gid(&self) -> u64 {
        self.gid
    }

    /// Stats `path` and copies its name, size, type and permission bits
    /// into this entry.
    ///
    /// Fails with [`ArchiveError::NotFound`] if the path does not exist and
    /// with [`ArchiveError::UnsupportedFileType`] for anything outside
    /// regular files, directories, symlinks and fifos. Field assignment
    /// order (pathname, size, type, permissions) is part of the contract:
    /// a classification failure leaves pathname and size already applied.
    pub fn populate_from_filesystem(&mut self, path: &Path) -> Result<()> {
        let metadata =
            fs::metadata(path).map_err(|_| ArchiveError::NotFound(path.to_path_buf()))?;

        self.set_pathname(
            path.file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| path.to_path_buf()),
        );
        self.set_size(metadata.len());

        let file_type = metadata.file_type();
        let entry_type = if file_type.is_file() {
            EntryType::RegularFile
        } else if file_type.is_dir() {
            EntryType::Directory
        } else if file_type.is_symlink() {
            EntryType::SymbolicLink
        } else if is_fifo(&file_type) {
            EntryType::Pipe
        } else {
            return Err(ArchiveError::UnsupportedFileType(path.to_path_buf()));
        };
        self.set_entry_type(entry_type);
        self.set_permissions(mode_bits(&metadata));
        Ok(())
    }

    /// Build an owned entry from a decoded codec entry.
    pub(crate) fn from_codec<R: io::Read>(entry: &tar::Entry<R>) -> Result<Self> {
        let header = entry.header();
        Ok(Entry {
            pathname: entry
                .path()
                .map_err(|e| ArchiveError::codec_context(e, "reading entry pathname"))?
                .into_owned(),
            size: header
                .size()
                .map_err(|e| ArchiveError::codec_context(e, "reading entry size"))?,
            entry_type: EntryType::from_tar(header.entry_type()),
            permissions: header
                .mode()
                .map_err(|e| ArchiveError::codec_context(e, "reading entry mode"))?,
            uid: header.uid().unwrap_or(0),
            gid: header.gid().unwrap_or(0),
        })
    }

    /// Build the codec header for this entry. The pathname is applied
    /// separately when the header is committed, since long names need the
    /// codec's extension records.
    pub(crate) fn to_tar_header(&self) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        // Size is meaningful only for regular files; anything else carries
        // no data stream.
        if self.entry_type == EntryType::RegularFile {
            header.set_size(self.size);
        } else {
            header.set_size(0);
        }
        header.set_entry_type(self.entry_type.to_tar());
        header.set_mode(self.permissions);
        header.set_uid(self.uid);
        header.set_gid(self.gid);
        header.set_mtime(0);
        header
    }
}

#[cfg(unix)]
fn is_fifo(file_type: &fs::FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    file_type.is_fifo()
}

#[cfg(not(unix))]
fn is_fifo(_file_type: &fs::FileType) -> bool {
    false
}

#[cfg(unix)]
fn mode_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
