//! Request representation and the conflict predicate.

use std::fmt::{self, Display};

use crate::ResolverError;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identity of the file or device a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileId(u64);

impl FileId {
    /// Creates a file id from a raw handle value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw handle value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for FileId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity assigned to a request when it is submitted.
///
/// Ids are handed out in submission order by a single resolver and are never
/// reused by it, so comparing two ids compares submission times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw submission sequence number.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Extent
// ============================================================================

/// Direction of an I/O request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    /// Returns true for [`Direction::Read`].
    pub fn is_read(self) -> bool {
        matches!(self, Direction::Read)
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => write!(f, "read"),
            Direction::Write => write!(f, "write"),
        }
    }
}

/// The part of a request the scheduler reasons about: direction, file and
/// the half-open byte range `[offset, offset + count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub direction: Direction,
    pub file: FileId,
    pub offset: i64,
    pub count: usize,
}

impl Extent {
    /// Creates an extent covering `count` bytes at `offset` in `file`.
    pub fn new(direction: Direction, file: FileId, offset: i64, count: usize) -> Self {
        Self {
            direction,
            file,
            offset,
            count,
        }
    }

    /// Creates a read extent.
    pub fn read(file: FileId, offset: i64, count: usize) -> Self {
        Self::new(Direction::Read, file, offset, count)
    }

    /// Creates a write extent.
    pub fn write(file: FileId, offset: i64, count: usize) -> Self {
        Self::new(Direction::Write, file, offset, count)
    }

    /// Returns true if this extent describes a read.
    pub fn is_read(&self) -> bool {
        self.direction.is_read()
    }

    /// Returns true for a zero-length range, which conflicts with nothing.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Exclusive end of the byte range, saturating at `i64::MAX`.
    pub fn end(&self) -> i64 {
        let count = i64::try_from(self.count).unwrap_or(i64::MAX);
        self.offset.saturating_add(count)
    }

    /// Checks the range is well formed: non-negative offset and an end that
    /// fits in an `i64`.
    pub fn validate(&self) -> Result<(), ResolverError> {
        if self.offset < 0 {
            return Err(ResolverError::NegativeOffset {
                offset: self.offset,
            });
        }
        i64::try_from(self.count)
            .ok()
            .and_then(|count| self.offset.checked_add(count))
            .map(|_| ())
            .ok_or(ResolverError::RangeOverflow {
                offset: self.offset,
                count: self.count,
            })
    }

    /// Half-open interval overlap, ignoring direction and file.
    ///
    /// Empty ranges overlap nothing.
    pub fn range_overlaps(&self, other: &Extent) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.offset < other.end() && other.offset < self.end()
    }

    /// The conflict predicate: true iff the two requests must not be in
    /// flight at the same time.
    ///
    /// Requests against different files never conflict. Two reads never
    /// conflict. Anything involving a write conflicts iff the ranges overlap.
    /// The relation is symmetric.
    pub fn conflicts_with(&self, other: &Extent) -> bool {
        self.file == other.file
            && !(self.is_read() && other.is_read())
            && self.range_overlaps(other)
    }
}

impl Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file={} [{}, {})",
            self.direction,
            self.file,
            self.offset,
            self.end()
        )
    }
}

// ============================================================================
// Request
// ============================================================================

/// One read or write over a byte range, plus the caller's buffer.
///
/// The buffer stays opaque to the resolver: it is parked while the request
/// is held, travels to the executor inside a [`Dispatched`] token, and comes
/// back to the caller through [`CompletionSink::report_done`](crate::CompletionSink::report_done).
pub struct Request<B> {
    extent: Extent,
    buffer: B,
}

impl<B> Request<B> {
    /// Creates a request for `extent` carrying `buffer`.
    pub fn new(extent: Extent, buffer: B) -> Self {
        Self { extent, buffer }
    }

    /// A read of `count` bytes at `offset`, to be filled into `buffer`.
    pub fn read(file: FileId, offset: i64, count: usize, buffer: B) -> Self {
        Self::new(Extent::read(file, offset, count), buffer)
    }

    /// A write of the first `count` bytes of `buffer` at `offset`.
    pub fn write(file: FileId, offset: i64, count: usize, buffer: B) -> Self {
        Self::new(Extent::write(file, offset, count), buffer)
    }

    /// Returns the direction, file and range of this request.
    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    /// Returns true if this is a read.
    pub fn is_read(&self) -> bool {
        self.extent.is_read()
    }

    /// Returns the target file.
    pub fn file(&self) -> FileId {
        self.extent.file
    }

    /// Returns the starting byte offset.
    pub fn offset(&self) -> i64 {
        self.extent.offset
    }

    /// Returns the number of bytes transferred.
    pub fn count(&self) -> usize {
        self.extent.count
    }

    /// Returns the caller's buffer.
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Returns the caller's buffer mutably.
    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    /// Consumes the request, returning its buffer.
    pub fn into_buffer(self) -> B {
        self.buffer
    }
}

// Payload bytes are never printed.
impl<B> fmt::Debug for Request<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("direction", &self.extent.direction)
            .field("file", &self.extent.file)
            .field("offset", &self.extent.offset)
            .field("count", &self.extent.count)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Dispatched token
// ============================================================================

/// A request that has been forwarded to the executor.
///
/// Only the resolver creates these, and they cannot be cloned: handing the
/// token back to [`ConflictResolver::on_completion`](crate::ConflictResolver::on_completion)
/// consumes it, so a request cannot be completed twice.
#[derive(Debug)]
pub struct Dispatched<B> {
    id: RequestId,
    request: Request<B>,
}

impl<B> Dispatched<B> {
    pub(crate) fn new(id: RequestId, request: Request<B>) -> Self {
        Self { id, request }
    }

    /// Returns the id assigned at submission.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the extent of the forwarded request.
    pub fn extent(&self) -> &Extent {
        self.request.extent()
    }

    /// Returns the forwarded request.
    pub fn request(&self) -> &Request<B> {
        &self.request
    }

    /// Mutable access for the executor, e.g. to fill a read buffer.
    pub fn request_mut(&mut self) -> &mut Request<B> {
        &mut self.request
    }

    pub(crate) fn into_parts(self) -> (RequestId, Request<B>) {
        (self.id, self.request)
    }
}
