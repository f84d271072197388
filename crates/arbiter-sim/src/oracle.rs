//! Serial-execution oracle.
//!
//! Applies operations one at a time in submission order. Because the
//! resolver never reorders conflicting requests, every read in a simulated
//! run must return exactly what the same read returns here.

use bytes::Bytes;

use crate::{MemStore, Op, SimError};

/// Reference executor with no concurrency at all.
#[derive(Debug, Default)]
pub struct SerialOracle {
    store: MemStore,
}

impl SerialOracle {
    /// Creates an oracle over an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `op`, returning the bytes read for a read.
    pub fn apply(&mut self, op: &Op) -> Result<Option<Bytes>, SimError> {
        let mut request = op.to_request();
        self.store.apply(&mut request)?;
        Ok(request.is_read().then(|| request.into_buffer().freeze()))
    }

    /// Expected result for every operation in order; `None` for writes.
    pub fn expected_reads(ops: &[Op]) -> Result<Vec<Option<Bytes>>, SimError> {
        let mut oracle = Self::new();
        ops.iter().map(|op| oracle.apply(op)).collect()
    }

    /// Returns the store after every applied operation.
    pub fn store(&self) -> &MemStore {
        &self.store
    }
}
