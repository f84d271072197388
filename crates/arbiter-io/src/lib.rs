//! # arbiter-io: Conflict-resolving dispatch for raw disk I/O
//!
//! This crate sits between callers issuing reads and writes against byte
//! ranges of a file and the executor that actually performs the I/O. It
//! guarantees the executor never runs two requests concurrently when doing
//! so could produce a wrong result, while letting everything else through
//! immediately.
//!
//! - Two reads never conflict.
//! - A read and a write, or two writes, conflict iff they target the same
//!   file and their byte ranges overlap.
//! - Conflicting requests are dispatched strictly in submission order.
//!
//! # Architecture
//!
//! ```text
//!   caller ──submit──▶ ┌──────────────────────┐ ──forward──▶ ┌──────────┐
//!                      │   ConflictResolver   │              │ Executor │
//!   caller ◀─report──  │  (ledger + predicate)│ ◀─on_completion─        │
//!                      └──────────────────────┘              └──────────┘
//! ```
//!
//! The resolver is a single-writer state machine: it performs no I/O and
//! never blocks. All asynchrony lives between [`Executor::forward`] and the
//! matching [`ConflictResolver::on_completion`].
//!
//! # Example
//!
//! ```
//! use arbiter_io::{ConflictResolver, Dispatched, FileId, Request, RequestId};
//!
//! let mut in_flight: Vec<Dispatched<Vec<u8>>> = Vec::new();
//! let mut resolver = ConflictResolver::new(
//!     |io: Dispatched<Vec<u8>>| in_flight.push(io),
//!     |_id: RequestId, _request: Request<Vec<u8>>| {},
//! );
//!
//! let file = FileId::new(0);
//! resolver.submit(Request::write(file, 0, 3, b"foo".to_vec())).unwrap();
//! resolver.submit(Request::read(file, 0, 3, vec![0; 3])).unwrap();
//!
//! // The read waits behind the overlapping write.
//! assert_eq!(resolver.dispatched_count(), 1);
//! assert_eq!(resolver.held_count(), 1);
//! ```

mod error;
mod executor;
mod ledger;
mod request;
mod resolver;

pub use error::ResolverError;
pub use executor::{CompletionSink, Executor};
pub use ledger::RequestState;
pub use request::{Direction, Dispatched, Extent, FileId, Request, RequestId};
pub use resolver::{ConflictResolver, ResolverStats};

#[cfg(test)]
mod tests;
