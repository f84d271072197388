//! Resolver error types.

use crate::RequestId;

/// Contract violations detected by the resolver.
///
/// I/O failures never show up here: they belong to the executor and travel
/// back to the caller inside the request's own buffer type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    /// Request offset is negative.
    #[error("negative request offset: {offset}")]
    NegativeOffset { offset: i64 },

    /// `offset + count` does not fit in an `i64`.
    #[error("request range overflows: offset {offset} + count {count}")]
    RangeOverflow { offset: i64, count: usize },

    /// Completion for a request this resolver is not tracking.
    #[error("completion for unknown request {id}")]
    UnknownRequest { id: RequestId },

    /// Completion for a request that was never forwarded.
    #[error("completion for request {id} which is still held")]
    NotDispatched { id: RequestId },
}
