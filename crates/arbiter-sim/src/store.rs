//! In-memory backing store.

use std::collections::HashMap;
use std::ops::Range;

use arbiter_io::{Extent, FileId, Request};

use crate::SimError;

/// Byte contents of every simulated file.
///
/// Files start empty and grow on demand; bytes never written read as zero.
/// An optional per-file capacity makes I/O past it fail as a full disk.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    files: HashMap<FileId, Vec<u8>>,
    capacity: Option<usize>,
}

impl MemStore {
    /// Creates an empty store with unbounded files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose files cannot grow past `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            files: HashMap::new(),
            capacity: Some(capacity),
        }
    }

    /// Performs `request` against the store: fills the buffer for a read,
    /// copies the buffer in for a write.
    ///
    /// At most `min(count, buffer.len())` bytes move.
    pub fn apply<B>(&mut self, request: &mut Request<B>) -> Result<(), SimError>
    where
        B: AsRef<[u8]> + AsMut<[u8]>,
    {
        let extent = *request.extent();
        if request.is_read() {
            let buf = request.buffer_mut().as_mut();
            let len = extent.count.min(buf.len());
            let data = self.reserve(&extent, len)?;
            buf[..len].copy_from_slice(data);
        } else {
            let buf = request.buffer().as_ref();
            let len = extent.count.min(buf.len());
            self.reserve(&extent, len)?.copy_from_slice(&buf[..len]);
        }
        Ok(())
    }

    /// Current contents of `file`.
    pub fn contents(&self, file: FileId) -> &[u8] {
        self.files.get(&file).map(Vec::as_slice).unwrap_or_default()
    }

    /// Grows the file to cover `len` bytes from the extent's offset and
    /// returns that slice.
    fn reserve(&mut self, extent: &Extent, len: usize) -> Result<&mut [u8], SimError> {
        let range = byte_range(extent, len)?;
        if let Some(capacity) = self.capacity.filter(|&capacity| range.end > capacity) {
            return Err(SimError::DiskFull {
                extent: *extent,
                capacity,
            });
        }
        let data = self.files.entry(extent.file).or_default();
        if data.len() < range.end {
            data.resize(range.end, 0);
        }
        Ok(&mut data[range])
    }
}

fn byte_range(extent: &Extent, len: usize) -> Result<Range<usize>, SimError> {
    let start = usize::try_from(extent.offset)
        .map_err(|_| SimError::InvalidExtent { extent: *extent })?;
    let end = start
        .checked_add(len)
        .ok_or(SimError::InvalidExtent { extent: *extent })?;
    Ok(start..end)
}
