//! Simulated disk executor.
//!
//! Forwarded requests are parked until the test permits them; only then is
//! the I/O applied to the backing store. Completion order is therefore
//! whatever the test (or the seeded RNG) picks.

use std::collections::{BTreeMap, HashSet};

use arbiter_io::{Dispatched, Executor, RequestId};
use rand::Rng;

use crate::{MemStore, SimError, Trace, TraceEvent};

/// Executor that parks forwarded requests until they are permitted.
#[derive(Debug)]
pub struct SimDisk<B> {
    store: MemStore,
    in_flight: BTreeMap<RequestId, Dispatched<B>>,
    /// Every id ever forwarded.
    begun: HashSet<RequestId>,
    max_in_flight: usize,
    trace: Trace,
}

impl<B> SimDisk<B> {
    /// Creates a disk over an empty, unbounded store.
    pub fn new(trace: Trace) -> Self {
        Self::with_store(MemStore::new(), trace)
    }

    /// Creates a disk over `store`.
    pub fn with_store(store: MemStore, trace: Trace) -> Self {
        Self {
            store,
            in_flight: BTreeMap::new(),
            begun: HashSet::new(),
            max_in_flight: 0,
            trace,
        }
    }

    /// Returns true once `id` has been forwarded, even if it has since run.
    pub fn has_begun(&self, id: RequestId) -> bool {
        self.begun.contains(&id)
    }

    /// Returns true while `id` is parked waiting for a permit.
    pub fn is_in_flight(&self, id: RequestId) -> bool {
        self.in_flight.contains_key(&id)
    }

    /// Returns the number of parked requests.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Largest number of requests ever in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Returns the backing store.
    pub fn store(&self) -> &MemStore {
        &self.store
    }
}

impl<B> SimDisk<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Performs the I/O for `id` and returns its token for completion.
    ///
    /// Returns `Ok(None)` if `id` is not in flight. If the store rejects the
    /// I/O the request stays in flight.
    pub fn execute(&mut self, id: RequestId) -> Result<Option<Dispatched<B>>, SimError> {
        let Some(io) = self.in_flight.get_mut(&id) else {
            return Ok(None);
        };
        self.store.apply(io.request_mut())?;
        Ok(self.in_flight.remove(&id))
    }

    /// Performs the I/O for a randomly chosen in-flight request.
    pub fn execute_random<R: Rng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Option<Dispatched<B>>, SimError> {
        if self.in_flight.is_empty() {
            return Ok(None);
        }
        let pick = rng.gen_range(0..self.in_flight.len());
        match self.in_flight.keys().nth(pick).copied() {
            Some(id) => self.execute(id),
            None => Ok(None),
        }
    }
}

impl<B> Executor<B> for SimDisk<B> {
    fn forward(&mut self, io: Dispatched<B>) {
        let id = io.id();
        self.trace.record(TraceEvent::Forwarded {
            id,
            extent: *io.extent(),
        });
        self.begun.insert(id);
        self.in_flight.insert(id, io);
        self.max_in_flight = self.max_in_flight.max(self.in_flight.len());
    }
}
