//! File-backed block store.
//!
//! The [`FileBlockStore`] handles all direct file operations:
//! - Reading and writing blocks
//! - Allocating new block ids
//! - Verifying per-block checksums

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::common::config::DEFAULT_BLOCK_SIZE;
use crate::common::{BlockId, Error, Result};
use crate::storage::BlockStore;

/// Size of the CRC32 trailer stored after each block.
const CHECKSUM_SIZE: usize = 4;

/// Settings for creating or opening a [`FileBlockStore`].
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Path of the database file.
    pub path: PathBuf,
    /// Block size in bytes. Must match the size the file was created with.
    pub block_size: usize,
    /// `fsync` after every write and allocation.
    pub sync_on_write: bool,
}

impl FileStoreConfig {
    /// Config for `path` with the default block size and syncing enabled.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            block_size: DEFAULT_BLOCK_SIZE,
            sync_on_write: true,
        }
    }

    fn slot_size(&self) -> u64 {
        (self.block_size + CHECKSUM_SIZE) as u64
    }
}

struct FileState {
    file: File,
    /// Number of allocated blocks in the file.
    block_count: u64,
}

/// Stores blocks in a single file.
///
/// # File Layout
/// Blocks are laid out sequentially, each followed by its checksum:
/// ```text
/// ┌──────────────┬─────┬──────────────┬─────┬─────┐
/// │   Block 0    │ crc │   Block 1    │ crc │ ... │
/// │ (block_size) │ (4) │ (block_size) │ (4) │     │
/// └──────────────┴─────┴──────────────┴─────┴─────┘
/// ```
///
/// Block N is located at file offset `N × (block_size + 4)`. The trailer is
/// the little-endian CRC32 of the block bytes.
///
/// # Thread Safety
/// The file handle is behind a `Mutex`; calls from concurrent blocking
/// threads are serialized.
pub struct FileBlockStore {
    config: FileStoreConfig,
    state: Mutex<FileState>,
    attached: AtomicBool,
}

impl FileBlockStore {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create(config: FileStoreConfig) -> Result<Self> {
        Self::check_block_size(&config)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&config.path)?;

        Ok(Self {
            config,
            state: Mutex::new(FileState {
                file,
                block_count: 0,
            }),
            attached: AtomicBool::new(false),
        })
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist, cannot be opened, or its
    /// length is not a whole number of block slots.
    pub fn open(config: FileStoreConfig) -> Result<Self> {
        Self::check_block_size(&config)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.path)?;

        let file_size = file.metadata()?.len();
        if file_size % config.slot_size() != 0 {
            return Err(Error::Config(format!(
                "file size {} is not a multiple of the block slot size {}",
                file_size,
                config.slot_size()
            )));
        }
        let block_count = file_size / config.slot_size();

        Ok(Self {
            config,
            state: Mutex::new(FileState { file, block_count }),
            attached: AtomicBool::new(false),
        })
    }

    /// Open an existing database file, or create if it doesn't exist.
    pub fn open_or_create(config: FileStoreConfig) -> Result<Self> {
        if config.path.exists() {
            Self::open(config)
        } else {
            Self::create(config)
        }
    }

    /// Get the number of allocated blocks.
    pub fn block_count(&self) -> u64 {
        self.state.lock().block_count
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn check_block_size(config: &FileStoreConfig) -> Result<()> {
        if config.block_size == 0 {
            return Err(Error::Config("block_size must be > 0".into()));
        }
        Ok(())
    }

    fn offset(&self, block_id: BlockId) -> u64 {
        block_id.0 * self.config.slot_size()
    }

    fn write_slot(&self, state: &mut FileState, block_id: BlockId, data: &[u8]) -> Result<()> {
        let checksum = crc32fast::hash(data);
        state.file.seek(SeekFrom::Start(self.offset(block_id)))?;
        state.file.write_all(data)?;
        state.file.write_all(&checksum.to_le_bytes())?;
        if self.config.sync_on_write {
            state.file.sync_all()?;
        }
        Ok(())
    }
}

impl BlockStore for FileBlockStore {
    fn block_size(&self) -> usize {
        self.config.block_size
    }

    fn allocate_block_id(&self) -> Result<BlockId> {
        let mut state = self.state.lock();
        if state.block_count >= BlockId::NULL.0 {
            return Err(Error::OutOfBlockIds);
        }
        let block_id = BlockId::new(state.block_count);

        // Extend the file with a zeroed, checksummed slot.
        let zeros = vec![0u8; self.config.block_size];
        self.write_slot(&mut state, block_id, &zeros)?;

        state.block_count += 1;
        Ok(block_id)
    }

    fn read_block(&self, block_id: BlockId) -> Result<Box<[u8]>> {
        let mut state = self.state.lock();
        if !block_id.is_valid() || block_id.0 >= state.block_count {
            return Err(Error::BlockNotFound(block_id));
        }

        let mut slot = vec![0u8; self.config.block_size + CHECKSUM_SIZE];
        state.file.seek(SeekFrom::Start(self.offset(block_id)))?;
        state.file.read_exact(&mut slot)?;

        let (data, trailer) = slot.split_at(self.config.block_size);
        let mut stored = [0u8; CHECKSUM_SIZE];
        stored.copy_from_slice(trailer);
        if crc32fast::hash(data) != u32::from_le_bytes(stored) {
            return Err(Error::Corruption(block_id));
        }

        slot.truncate(self.config.block_size);
        Ok(slot.into_boxed_slice())
    }

    fn write_block(&self, block_id: BlockId, data: &[u8]) -> Result<()> {
        if data.len() != self.config.block_size {
            return Err(Error::BlockSizeMismatch {
                block_id,
                expected: self.config.block_size,
                actual: data.len(),
            });
        }

        let mut state = self.state.lock();
        if !block_id.is_valid() || block_id.0 >= state.block_count {
            return Err(Error::BlockNotFound(block_id));
        }
        self.write_slot(&mut state, block_id, data)
    }

    fn try_attach(&self) -> bool {
        self.attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }
}
