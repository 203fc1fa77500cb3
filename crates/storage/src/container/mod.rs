//! The single unified file container.
//!
//! `FileContainer` owns the `.edb` file: a read-only memory map shared by
//! every reader, and a single exclusive write handle used for appends and
//! header updates. It is the only piece of code in the workspace that opens
//! the file directly.
//!
//! `memmap2` backs the mmap read path and `fs2` the advisory file lock.
//! Header updates follow a write-then-fsync-then-replace protocol, applied
//! to an in-place 128-byte header update rather than a side file.

pub mod header;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fs2::FileExt;
use memmap2::Mmap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

pub use header::{Header, HeaderError, FORMAT_VERSION, HEADER_SIZE, MAGIC};

/// A snapshot of the memory map plus the read-generation it was taken at.
///
/// Readers hold this for the duration of a single logical read; because it
/// owns an `Arc<Mmap>`, a concurrent remap (triggered by a checkpoint) never
/// invalidates bytes a reader is already looking at — the old mapping stays
/// alive until every `MmapView` referencing it is dropped.
#[derive(Clone)]
pub struct MmapView {
    mmap: Arc<Mmap>,
    generation: u64,
}

impl MmapView {
    /// The generation this view was taken at.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Read `len` bytes starting at `offset`. Never blocks the writer: it
    /// only touches the `Arc<Mmap>` this view already owns.
    pub fn read_at(&self, offset: u64, len: usize) -> io::Result<&[u8]> {
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "read range overflow"))?;
        self.mmap.get(start..end).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read [{start}, {end}) past mapped length {}", self.mmap.len()),
            )
        })
    }

    /// Total mapped length.
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// The single unified `.edb` file.
pub struct FileContainer {
    path: PathBuf,
    write_file: Mutex<File>,
    mmap: RwLock<Arc<Mmap>>,
    generation: AtomicU64,
}

impl FileContainer {
    /// Create a brand-new `.edb` file at `path`, failing if it already
    /// exists.
    pub fn create(path: impl AsRef<Path>, created_ns: i64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        let header = Header::new_empty(created_ns);
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;
        Self::from_file(path, file)
    }

    /// Open an existing `.edb` file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Self::from_file(path, file)
    }

    /// Open `path` if it exists, otherwise create it fresh.
    pub fn open_or_create(path: impl AsRef<Path>, created_ns: i64) -> io::Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path, created_ns)
        }
    }

    fn from_file(path: PathBuf, file: File) -> io::Result<Self> {
        // Advisory exclusive lock: guards against two processes opening the
        // same unified file as writers at once. Readers within this process
        // coordinate through `mmap`/`generation`, not this lock.
        file.try_lock_exclusive().map_err(|e| {
            io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("another process holds the EntityDB file lock: {e}"),
            )
        })?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(FileContainer {
            path,
            write_file: Mutex::new(file),
            mmap: RwLock::new(Arc::new(mmap)),
            generation: AtomicU64::new(0),
        })
    }

    /// The path to the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take a stable view of the current memory map.
    pub fn view(&self) -> MmapView {
        let mmap = self.mmap.read().clone();
        MmapView {
            mmap,
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    /// Read the current on-disk header.
    pub fn read_header(&self) -> Result<Header, HeaderError> {
        let view = self.view();
        let bytes = view
            .read_at(0, HEADER_SIZE)
            .map_err(|_| HeaderError::TooShort(view.len()))?;
        Header::from_bytes(bytes)
    }

    /// `ReadAt(offset, len) -> bytes`. Never blocks the writer.
    pub fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let view = self.view();
        view.read_at(offset, len).map(|b| b.to_vec())
    }

    /// `Append(record_bytes) -> new_offset`.
    ///
    /// Holds the writer lock for the duration of the write + fsync. Callers
    /// in `entitydb-durability` are expected to have already written the
    /// corresponding WAL record and fsynced it *before* calling this, since
    /// the entity-section append itself is deferred to checkpoint — this
    /// method is the raw primitive both the WAL append and the checkpoint's
    /// entity-section fold use.
    pub fn append(&self, record_bytes: &[u8]) -> io::Result<u64> {
        let mut file = self.write_file.lock();
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(record_bytes)?;
        file.sync_data()?;
        debug!(offset, len = record_bytes.len(), "container append");
        Ok(offset)
    }

    /// Write `bytes` at an explicit offset, growing the file if needed. Used
    /// by the checkpointer to lay out the index section at a known offset
    /// before updating the header to point at it.
    pub fn write_at(&self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let mut file = self.write_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        file.sync_data()?;
        Ok(())
    }

    /// Write `bytes` at an explicit offset without fsyncing. Used by the WAL
    /// writer under durability modes that batch or defer fsync; callers are
    /// responsible for calling [`FileContainer::sync`] per their mode.
    pub fn write_at_unsynced(&self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let mut file = self.write_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }

    /// Fsync the write handle's data. Used explicitly by callers that wrote
    /// via [`FileContainer::write_at_unsynced`].
    pub fn sync(&self) -> io::Result<()> {
        self.write_file.lock().sync_data()
    }

    /// Current physical length of the file.
    pub fn file_len(&self) -> io::Result<u64> {
        Ok(self.write_file.lock().metadata()?.len())
    }

    /// Truncate the file to `len` bytes. Used when the WAL region is folded
    /// into the entity section and can be discarded.
    pub fn truncate(&self, len: u64) -> io::Result<()> {
        let file = self.write_file.lock();
        file.set_len(len)?;
        file.sync_all()?;
        Ok(())
    }

    /// `UpdateHeader(header)` — called only by the checkpointer. An in-place update of the first 128 bytes is atomic on all
    /// supported filesystems when aligned to the first page, so this does
    /// not need a write-then-rename dance the way a side MANIFEST file
    /// would.
    pub fn update_header(&self, header: &Header) -> io::Result<()> {
        let mut file = self.write_file.lock();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;
        drop(file);
        self.remap()
    }

    /// Refresh the shared memory map after a checkpoint moves region
    /// boundaries, and bump the read-generation counter. Readers that
    /// already took a [`MmapView`] keep their `Arc<Mmap>` alive and complete
    /// against the old mapping.
    pub fn remap(&self) -> io::Result<()> {
        let file = self.write_file.lock();
        let new_mmap = unsafe { Mmap::map(&*file) }?;
        drop(file);
        *self.mmap.write() = Arc::new(new_mmap);
        let gen = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(generation = gen, "container remap");
        Ok(())
    }

    /// The current read-generation. Monotonically increases on every
    /// [`FileContainer::remap`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Detect and discard a torn append: bytes written past the header's
    /// recorded region end with no corresponding header update. Returns the
    /// valid file length.
    ///
    /// This does not mutate the file; callers (recovery) decide whether to
    /// actually truncate.
    pub fn detect_torn_tail(&self, header: &Header) -> io::Result<u64> {
        let recorded_end = header.wal_offset.max(header.index_offset) + header
            .wal_length
            .max(header.index_length)
            .max(0);
        let actual_len = self.write_file.lock().metadata()?.len();
        if actual_len > recorded_end {
            warn!(
                recorded_end,
                actual_len, "torn append detected past recorded region end"
            );
        }
        Ok(recorded_end.min(actual_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_open_round_trips_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.edb");
        {
            let c = FileContainer::create(&path, 42).unwrap();
            let h = c.read_header().unwrap();
            assert_eq!(h.created_ns, 42);
            assert_eq!(h.entity_count, 0);
        }
        let c = FileContainer::open(&path).unwrap();
        let h = c.read_header().unwrap();
        assert_eq!(h.created_ns, 42);
    }

    #[test]
    fn append_returns_increasing_offsets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.edb");
        let c = FileContainer::create(&path, 0).unwrap();
        let off1 = c.append(b"hello").unwrap();
        let off2 = c.append(b"world!").unwrap();
        assert_eq!(off1, HEADER_SIZE as u64);
        assert_eq!(off2, off1 + 5);
    }

    #[test]
    fn remap_bumps_generation_and_old_view_stays_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.edb");
        let c = FileContainer::create(&path, 0).unwrap();
        let before = c.view();
        assert_eq!(before.generation(), 0);
        c.append(b"data").unwrap();
        c.remap().unwrap();
        let after = c.view();
        assert_eq!(after.generation(), 1);
        // old view's bytes are still readable even though file has grown
        assert!(before.read_at(0, HEADER_SIZE).is_ok());
    }

    #[test]
    fn read_at_past_end_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.edb");
        let c = FileContainer::create(&path, 0).unwrap();
        assert!(c.read_at(0, HEADER_SIZE + 1000).is_err());
    }
}
