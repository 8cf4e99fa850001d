//! Byte-range sources for random access into a raster file.
//!
//! Tiles are fetched by absolute offset and length. None of the sources keep
//! a shared cursor, so one opened raster can serve many threads at once.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::Result;

/// Random-access reader over the bytes of a raster file.
pub trait RangeSource: Send + Sync {
    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// Fails with an `UnexpectedEof` I/O error if the range extends past the
    /// end of the source.
    fn read_range(&self, offset: u64, length: usize) -> Result<Bytes>;

    /// Total size of the source in bytes.
    fn len(&self) -> u64;

    /// Whether the source holds no bytes at all.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable identifier for logs and errors.
    fn identifier(&self) -> &str;
}

/// Local file read with positional reads.
pub struct FileSource {
    file: File,
    path: PathBuf,
    size: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, path, size })
    }
}

impl RangeSource for FileSource {
    fn read_range(&self, offset: u64, length: usize) -> Result<Bytes> {
        check_range(offset, length, self.size)?;
        let mut buffer = vec![0u8; length];
        read_exact_at(&self.file, &mut buffer, offset)?;
        Ok(Bytes::from(buffer))
    }

    fn len(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        self.path.to_str().unwrap_or("<invalid path>")
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buffer: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buffer, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, buffer: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut filled = 0;
    while filled < buffer.len() {
        let n = file.seek_read(&mut buffer[filled..], offset + filled as u64)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "failed to fill whole buffer",
            ));
        }
        filled += n;
    }
    Ok(())
}

/// Raster held entirely in memory.
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl RangeSource for MemorySource {
    fn read_range(&self, offset: u64, length: usize) -> Result<Bytes> {
        check_range(offset, length, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + length))
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        "<memory>"
    }
}

fn check_range(offset: u64, length: usize, size: u64) -> Result<()> {
    let end = offset.checked_add(length as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "range {}+{} exceeds source size {}",
                offset, length, size
            ),
        )
        .into()),
    }
}
