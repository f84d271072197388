//! Permit-driven test driver.
//!
//! Submissions go straight to the resolver; nothing completes until the test
//! calls [`SimDriver::permit`] for a specific request (or lets the RNG pick
//! one). That gives tests full control over completion order.

use arbiter_io::{ConflictResolver, FileId, Request, RequestId};
use bytes::BytesMut;
use rand::Rng;
use tracing::trace;

use crate::invariant::check_trace;
use crate::{CompletionLog, MemStore, SimDisk, SimError, Trace, TraceEvent};

/// The resolver as wired up by the simulator.
pub type SimResolver = ConflictResolver<BytesMut, SimDisk<BytesMut>, CompletionLog<BytesMut>>;

/// Owns a [`SimResolver`] wired to a [`SimDisk`] and a [`CompletionLog`],
/// all sharing one [`Trace`].
pub struct SimDriver {
    resolver: SimResolver,
    trace: Trace,
}

impl SimDriver {
    /// Creates a driver over an empty, unbounded store.
    pub fn new() -> Self {
        Self::with_store(MemStore::new())
    }

    /// Creates a driver whose disk runs against `store`.
    pub fn with_store(store: MemStore) -> Self {
        let trace = Trace::new();
        let resolver = ConflictResolver::new(
            SimDisk::with_store(store, trace.clone()),
            CompletionLog::new(trace.clone()),
        );
        Self { resolver, trace }
    }

    /// Submits `request`, recording it in the trace once `submit` returns.
    pub fn submit(&mut self, request: Request<BytesMut>) -> Result<RequestId, SimError> {
        let extent = *request.extent();
        let id = self.resolver.submit(request)?;
        self.trace.record(TraceEvent::Submitted { id, extent });
        Ok(id)
    }

    /// Submits a write of `data` at `offset`.
    pub fn submit_write(
        &mut self,
        file: FileId,
        offset: i64,
        data: &[u8],
    ) -> Result<RequestId, SimError> {
        self.submit(Request::write(
            file,
            offset,
            data.len(),
            BytesMut::from(data),
        ))
    }

    /// Submits a read of `len` bytes at `offset` into a zeroed buffer.
    pub fn submit_read(
        &mut self,
        file: FileId,
        offset: i64,
        len: usize,
    ) -> Result<RequestId, SimError> {
        self.submit(Request::read(file, offset, len, BytesMut::zeroed(len)))
    }

    /// Returns true once the disk has received `id`.
    pub fn has_begun(&self, id: RequestId) -> bool {
        self.resolver.executor().has_begun(id)
    }

    /// Returns true once `id` has been reported done.
    pub fn is_done(&self, id: RequestId) -> bool {
        self.resolver.sink().is_done(id)
    }

    /// True once the resolver has forwarded the request.
    pub fn was_sent(&self, id: RequestId) -> bool {
        self.has_begun(id) || self.is_done(id)
    }

    /// Lets the disk run request `id` and completes it.
    ///
    /// Completing an already finished request is a no-op.
    pub fn permit(&mut self, id: RequestId) -> Result<(), SimError> {
        if self.is_done(id) {
            return Ok(());
        }
        let io = self
            .resolver
            .executor_mut()
            .execute(id)?
            .ok_or(SimError::NotInFlight { id })?;
        trace!(request = %id, "permitted");
        self.resolver.on_completion(io)?;
        Ok(())
    }

    /// Completes one randomly chosen in-flight request, if any.
    pub fn permit_random<R: Rng>(&mut self, rng: &mut R) -> Result<Option<RequestId>, SimError> {
        let Some(io) = self.resolver.executor_mut().execute_random(rng)? else {
            return Ok(None);
        };
        let id = io.id();
        trace!(request = %id, "permitted");
        self.resolver.on_completion(io)?;
        Ok(Some(id))
    }

    /// Completes in-flight requests in random order until nothing is
    /// outstanding.
    pub fn drain<R: Rng>(&mut self, rng: &mut R) -> Result<(), SimError> {
        while !self.resolver.is_idle() {
            if self.permit_random(rng)?.is_none() {
                return Err(SimError::Stalled {
                    held: self.resolver.held_count(),
                });
            }
        }
        Ok(())
    }

    /// Returns the number of requests parked at the disk.
    pub fn in_flight_count(&self) -> usize {
        self.resolver.executor().in_flight_count()
    }

    /// Bytes a completed read returned.
    pub fn read_result(&self, id: RequestId) -> Option<&[u8]> {
        self.resolver
            .sink()
            .get(id)
            .filter(|request| request.is_read())
            .map(|request| &request.buffer()[..])
    }

    /// Checks that completed read `id` returned exactly `expected`.
    pub fn expect_read(&self, id: RequestId, expected: &[u8]) -> Result<(), SimError> {
        let actual = self
            .read_result(id)
            .ok_or(SimError::NotCompleted { id })?;
        if actual != expected {
            return Err(SimError::ReadMismatch {
                id,
                expected: String::from_utf8_lossy(expected).into_owned(),
                actual: String::from_utf8_lossy(actual).into_owned(),
            });
        }
        Ok(())
    }

    /// Replays the trace through every invariant checker.
    pub fn check_invariants(&self) -> Result<(), SimError> {
        match check_trace(&self.trace.events()).into_error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Returns the resolver under test.
    pub fn resolver(&self) -> &SimResolver {
        &self.resolver
    }

    /// Returns the shared event trace.
    pub fn trace(&self) -> &Trace {
        &self.trace
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}
