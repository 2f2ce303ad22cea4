//! Archive entry buffering.
//!
//! Every parser needs its own rewindable view of an archive entry, but the
//! archive itself is a forward-only stream. Entries up to the spool threshold
//! are read into memory once and shared; larger entries are copied to a
//! temporary file in the scratch directory, which each reader reopens.
//!
//! ```text
//! tar entry ──► size <= threshold ──► Arc<[u8]>      ──► Cursor per reader
//!           └─► size >  threshold ──► NamedTempFile  ──► reopened File per reader
//! ```

use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::SpoolError;

/// Entries larger than this many bytes are spooled to disk (1 GiB)
pub const DEFAULT_SPOOL_THRESHOLD: u64 = 1 << 30;

/// Upper bound on the up-front allocation for an in-memory entry. The declared
/// size comes from the archive header and is not trusted.
const MAX_PREALLOCATION: usize = 64 * 1024;

/// Longest temporary file prefix derived from an entry path
const MAX_PREFIX_LEN: usize = 64;

pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// An independent, seekable reader over one archive entry
pub type EntryReader = Box<dyn ReadSeek>;

/// Where and when archive entries are spooled to disk
#[derive(Debug, Clone)]
pub struct SpoolConfig {
    /// Entries with a declared size above this are written to a temporary file
    pub threshold: u64,
    /// Directory receiving temporary files
    pub scratch_dir: PathBuf,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SPOOL_THRESHOLD,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl SpoolConfig {
    pub fn new(threshold: u64, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            threshold,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Buffer an archive entry so it can be read any number of times
    ///
    /// # Arguments
    /// * `entry_path` - Path of the entry inside the archive, used to name the temporary file
    /// * `size` - Declared size of the entry in bytes
    /// * `reader` - Forward-only entry content
    ///
    /// # Returns
    /// * `Result<EntryBuffer, SpoolError>` - A reader factory which must be released with
    ///   [`EntryBuffer::release`]
    pub fn buffer<R: Read>(
        &self,
        entry_path: &Path,
        size: u64,
        mut reader: R,
    ) -> Result<EntryBuffer, SpoolError> {
        if size > self.threshold {
            let prefix = temp_file_prefix(entry_path);
            debug!(
                path = %entry_path.display(),
                size,
                scratch_dir = %self.scratch_dir.display(),
                "spooling large image file to disk"
            );

            let mut tmp = tempfile::Builder::new()
                .prefix(&prefix)
                .tempfile_in(&self.scratch_dir)
                .map_err(SpoolError::Create)?;
            io::copy(&mut reader, &mut tmp).map_err(SpoolError::Write)?;
            tmp.flush().map_err(SpoolError::Write)?;

            return Ok(EntryBuffer::Spooled(tmp));
        }

        let mut contents = Vec::with_capacity(initial_capacity(size));
        reader
            .read_to_end(&mut contents)
            .map_err(SpoolError::Read)?;
        Ok(EntryBuffer::Memory(contents.into()))
    }
}

/// Re-readable content of one archive entry
#[derive(Debug)]
pub enum EntryBuffer {
    Memory(Arc<[u8]>),
    Spooled(NamedTempFile),
}

impl EntryBuffer {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        EntryBuffer::Memory(bytes.into())
    }

    /// Open a fresh reader positioned at the start of the entry.
    pub fn open(&self) -> io::Result<EntryReader> {
        match self {
            EntryBuffer::Memory(contents) => Ok(Box::new(Cursor::new(Arc::clone(contents)))),
            EntryBuffer::Spooled(tmp) => Ok(Box::new(tmp.reopen()?)),
        }
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self, EntryBuffer::Spooled(_))
    }

    /// Release the entry, deleting any temporary file.
    pub fn release(self) -> io::Result<()> {
        match self {
            EntryBuffer::Memory(_) => Ok(()),
            EntryBuffer::Spooled(tmp) => tmp.close(),
        }
    }
}

fn initial_capacity(declared_size: u64) -> usize {
    usize::try_from(declared_size).map_or(MAX_PREALLOCATION, |size| size.min(MAX_PREALLOCATION))
}

/// Flatten an entry path into a single file name component, so two entries
/// never collide and no entry can escape the scratch directory.
fn temp_file_prefix(entry_path: &Path) -> String {
    let flattened = entry_path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("-");

    if flattened.is_empty() {
        return "entry-".to_string();
    }

    // Keep the tail; the file name is more useful than the leading directories
    let mut start = flattened.len().saturating_sub(MAX_PREFIX_LEN);
    while !flattened.is_char_boundary(start) {
        start += 1;
    }
    format!("{}-", &flattened[start..])
}
