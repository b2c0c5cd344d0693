// Backend implementations for image access - in-memory buffer and file

use log::{debug, trace};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::exceptions::{ForgeError, Result};

/// How an image is brought into the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read the whole file into memory up front
    #[default]
    Memory,
    /// Seek and read on demand
    File,
}

/// Trait for image access backends
pub trait Backend: Send + Sync {
    /// Total image size in bytes
    fn size(&self) -> u64;

    /// Read data at specific offset
    fn read_at(&mut self, offset: u64, size: usize) -> Result<Vec<u8>>;

    /// Get a view of data without copying (if supported)
    fn view_at(&self, _offset: u64, _size: usize) -> Result<&[u8]> {
        Err(ForgeError::Generic(
            "View not supported by this backend".into(),
        ))
    }

    /// Read the entire image
    fn read_all(&mut self) -> Result<Vec<u8>> {
        let size = usize::try_from(self.size())
            .map_err(|_| ForgeError::Generic("Image does not fit in memory".into()))?;
        self.read_at(0, size)
    }
}

/// Bounds check shared by all backends
fn check_range(offset: u64, length: usize, size: u64) -> Result<()> {
    let length = length as u64;
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(ForgeError::OutOfRange {
            offset,
            length,
            size,
        }),
    }
}

/// Backend over an owned byte buffer
pub struct MemoryBackend {
    data: Vec<u8>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("data", &format!("<{} bytes>", self.data.len()))
            .finish()
    }
}

impl MemoryBackend {
    pub fn new(data: Vec<u8>) -> Self {
        MemoryBackend { data }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let timer = Instant::now();
        let data = std::fs::read(path)?;
        debug!(
            "📁 Memory backend loaded {} ({} bytes) in {:?}",
            path.display(),
            data.len(),
            timer.elapsed()
        );
        Ok(Self::new(data))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Backend for MemoryBackend {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, size: usize) -> Result<Vec<u8>> {
        self.view_at(offset, size).map(<[u8]>::to_vec)
    }

    fn view_at(&self, offset: u64, size: usize) -> Result<&[u8]> {
        trace!("🔍 Memory view_at: offset={offset}, size={size}");
        check_range(offset, size, self.size())?;
        let start = offset as usize;
        Ok(&self.data[start..start + size])
    }
}

/// Traditional file I/O backend
pub struct FileBackend {
    file: File,
    path: PathBuf,
    size: u64,
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("file", &"<File>")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish()
    }
}

impl FileBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let timer = Instant::now();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        debug!(
            "📁 File backend opened {} ({} bytes) in {:?}",
            path.display(),
            size,
            timer.elapsed()
        );
        Ok(FileBackend {
            file,
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for FileBackend {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, size: usize) -> Result<Vec<u8>> {
        trace!("🗓️ File read_at: offset={offset}, size={size}");
        check_range(offset, size, self.size)?;

        let timer = Instant::now();
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; size];
        self.file.read_exact(&mut buffer)?;
        trace!("✅ File read {} bytes in {:?}", size, timer.elapsed());
        Ok(buffer)
    }
}

/// Create a backend for the given access mode
pub fn create_backend(path: &Path, mode: AccessMode) -> Result<Box<dyn Backend>> {
    debug!("🔧 Creating {mode:?} backend for {}", path.display());
    Ok(match mode {
        AccessMode::Memory => Box::new(MemoryBackend::open(path)?),
        AccessMode::File => Box::new(FileBackend::open(path)?),
    })
}
