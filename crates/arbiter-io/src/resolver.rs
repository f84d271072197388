//! The dispatch engine.

use tracing::{debug, trace};

use crate::ledger::{Admission, Ledger, RequestState};
use crate::{CompletionSink, Dispatched, Executor, Request, RequestId, ResolverError};

/// Point-in-time counters for an external metrics collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Requests currently in flight at the executor.
    pub dispatched: usize,
    /// Requests waiting behind an earlier conflicting request.
    pub held: usize,
    /// Requests accepted since construction.
    pub submitted: u64,
    /// Completions reported since construction.
    pub completed: u64,
    /// Largest number of simultaneously held requests observed.
    pub held_high_water: usize,
    /// Files with at least one outstanding request.
    pub files: usize,
}

/// Serializes conflicting disk requests while letting everything else run
/// concurrently.
///
/// On [`submit`](Self::submit) a request is forwarded immediately unless it
/// conflicts with an earlier outstanding request on the same file. On
/// [`on_completion`](Self::on_completion) the finished request is retired,
/// newly unblocked requests are promoted, the caller is told, and then the
/// promoted requests are forwarded in submission order.
///
/// The resolver owns its executor and completion sink and holds no global
/// state; drive it from one thread or event loop.
pub struct ConflictResolver<B, E, S> {
    ledger: Ledger<B>,
    executor: E,
    sink: S,
    next_id: u64,
    submitted: u64,
    completed: u64,
    held_high_water: usize,
}

impl<B, E, S> ConflictResolver<B, E, S>
where
    E: Executor<B>,
    S: CompletionSink<B>,
{
    /// Creates a resolver that forwards to `executor` and reports to `sink`.
    pub fn new(executor: E, sink: S) -> Self {
        Self {
            ledger: Ledger::new(),
            executor,
            sink,
            next_id: 0,
            submitted: 0,
            completed: 0,
            held_high_water: 0,
        }
    }

    /// Accepts a request, forwarding it synchronously if nothing earlier
    /// blocks it.
    ///
    /// Returns the request's id, which orders it against every other request
    /// submitted to this resolver. Rejects negative offsets and ranges whose
    /// end does not fit in an `i64`; nothing is recorded in that case.
    pub fn submit(&mut self, request: Request<B>) -> Result<RequestId, ResolverError> {
        request.extent().validate()?;

        let id = RequestId::new(self.next_id);
        self.next_id += 1;
        self.submitted += 1;
        let extent = *request.extent();

        match self.ledger.admit(id, request) {
            Admission::Dispatch(request) => {
                trace!(request = %id, extent = %extent, "dispatching");
                self.executor.forward(Dispatched::new(id, request));
            }
            Admission::Held => {
                self.held_high_water = self.held_high_water.max(self.ledger.held_count());
                debug!(
                    request = %id,
                    extent = %extent,
                    held = self.ledger.held_count(),
                    "holding behind conflicting request"
                );
            }
        }
        Ok(id)
    }

    /// Retires a request the executor has finished.
    ///
    /// Ordering: the ledger is updated (including every promotion this
    /// completion enables) before the sink is told, and the sink is told
    /// before any promoted request is forwarded.
    ///
    /// Returns an error, without touching any state, if the token was not
    /// issued by this resolver.
    pub fn on_completion(&mut self, io: Dispatched<B>) -> Result<(), ResolverError> {
        let (id, request) = io.into_parts();
        let file = self.ledger.retire(id, request.extent())?;
        let promoted = self.ledger.promote_after(file, id);
        self.completed += 1;

        trace!(request = %id, extent = %request.extent(), "completed");
        self.sink.report_done(id, request);

        for (next, request) in promoted {
            debug!(request = %next, unblocked_by = %id, extent = %request.extent(), "promoting");
            self.executor.forward(Dispatched::new(next, request));
        }
        Ok(())
    }

    /// Returns where an outstanding request is, or `None` once it has been
    /// reported done (or if it was never submitted here).
    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        self.ledger.state(id)
    }

    /// Returns the number of requests in flight at the executor.
    pub fn dispatched_count(&self) -> usize {
        self.ledger.dispatched_count()
    }

    /// Returns the number of requests waiting behind a conflict.
    pub fn held_count(&self) -> usize {
        self.ledger.held_count()
    }

    /// Returns dispatched plus held requests.
    pub fn outstanding_count(&self) -> usize {
        self.dispatched_count() + self.held_count()
    }

    /// True when no request is outstanding.
    pub fn is_idle(&self) -> bool {
        self.outstanding_count() == 0
    }

    /// Returns a snapshot of the resolver's counters.
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            dispatched: self.ledger.dispatched_count(),
            held: self.ledger.held_count(),
            submitted: self.submitted,
            completed: self.completed,
            held_high_water: self.held_high_water,
            files: self.ledger.file_count(),
        }
    }

    /// Returns the executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Returns the executor mutably, e.g. to run parked I/O.
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Returns the completion sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consumes the resolver, returning the executor and sink.
    ///
    /// Outstanding requests are dropped with it.
    pub fn into_parts(self) -> (E, S) {
        (self.executor, self.sink)
    }
}
