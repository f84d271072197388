//! Outstanding-request ledger.
//!
//! Every request between `submit` and its completion report lives here,
//! either *held* (waiting, payload parked in the ledger) or *dispatched*
//! (payload with the executor, only the extent kept).
//!
//! Requests are partitioned by file, since requests against different files
//! never conflict. Within a file, entries are kept in submission order, and a
//! request may be dispatched iff it conflicts with no earlier entry still in
//! the queue, dispatched or held. Checking against held predecessors too is
//! what keeps the order: conflicts are not transitive, so an earlier held
//! request has to guard its own place in line.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use crate::{Extent, FileId, Request, RequestId, ResolverError};

/// Where an outstanding request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Waiting behind an earlier conflicting request.
    Held,
    /// Forwarded to the executor and not yet completed.
    Dispatched,
}

enum Slot<B> {
    Held(Request<B>),
    Dispatched,
}

struct Entry<B> {
    extent: Extent,
    slot: Slot<B>,
}

impl<B> Entry<B> {
    fn state(&self) -> RequestState {
        match self.slot {
            Slot::Held(_) => RequestState::Held,
            Slot::Dispatched => RequestState::Dispatched,
        }
    }
}

/// Submission-ordered queue of one file's outstanding requests.
type FileQueue<B> = BTreeMap<RequestId, Entry<B>>;

/// Outcome of admitting a new request.
pub(crate) enum Admission<B> {
    /// No earlier conflict; the request is recorded as dispatched and handed
    /// back so the caller can forward it.
    Dispatch(Request<B>),
    /// Blocked; the request is parked in the ledger.
    Held,
}

pub(crate) struct Ledger<B> {
    files: HashMap<FileId, FileQueue<B>>,
    /// Which file queue holds each outstanding request.
    index: HashMap<RequestId, FileId>,
    dispatched: usize,
    held: usize,
}

impl<B> Ledger<B> {
    pub(crate) fn new() -> Self {
        Self {
            files: HashMap::new(),
            index: HashMap::new(),
            dispatched: 0,
            held: 0,
        }
    }

    pub(crate) fn dispatched_count(&self) -> usize {
        self.dispatched
    }

    pub(crate) fn held_count(&self) -> usize {
        self.held
    }

    pub(crate) fn file_count(&self) -> usize {
        self.files.len()
    }

    pub(crate) fn state(&self, id: RequestId) -> Option<RequestState> {
        let file = self.index.get(&id)?;
        self.files.get(file)?.get(&id).map(Entry::state)
    }

    /// Records a newly submitted request.
    ///
    /// `id` must be greater than every id already in the ledger.
    pub(crate) fn admit(&mut self, id: RequestId, request: Request<B>) -> Admission<B> {
        let extent = *request.extent();
        let queue = self.files.entry(extent.file).or_default();
        debug_assert!(
            queue.keys().next_back().is_none_or(|last| *last < id),
            "request ids must be admitted in increasing order"
        );

        let blocked = has_conflicting_predecessor(queue, id, &extent);
        let (slot, admission) = if blocked {
            self.held += 1;
            (Slot::Held(request), Admission::Held)
        } else {
            self.dispatched += 1;
            (Slot::Dispatched, Admission::Dispatch(request))
        };

        queue.insert(id, Entry { extent, slot });
        self.index.insert(id, extent.file);
        admission
    }

    /// Removes a dispatched request, returning its file.
    ///
    /// `extent` is the extent carried by the completion token; a mismatch
    /// means the token was not issued for this ledger's request.
    pub(crate) fn retire(&mut self, id: RequestId, extent: &Extent) -> Result<FileId, ResolverError> {
        let file = *self
            .index
            .get(&id)
            .ok_or(ResolverError::UnknownRequest { id })?;
        let queue = self
            .files
            .get_mut(&file)
            .ok_or(ResolverError::UnknownRequest { id })?;
        let entry = queue.get(&id).ok_or(ResolverError::UnknownRequest { id })?;

        if entry.extent != *extent {
            return Err(ResolverError::UnknownRequest { id });
        }
        if entry.state() == RequestState::Held {
            return Err(ResolverError::NotDispatched { id });
        }

        queue.remove(&id);
        if queue.is_empty() {
            self.files.remove(&file);
        }
        self.index.remove(&id);
        self.dispatched -= 1;
        Ok(file)
    }

    /// Promotes every held request in `file` that no longer has an earlier
    /// conflicting entry, returning them in submission order.
    ///
    /// Only entries submitted after `retired` can have been unblocked by its
    /// removal. One pass suffices: promoting an entry leaves it in the queue,
    /// so it still shadows later conflicting entries exactly as before.
    pub(crate) fn promote_after(
        &mut self,
        file: FileId,
        retired: RequestId,
    ) -> Vec<(RequestId, Request<B>)> {
        let Some(queue) = self.files.get_mut(&file) else {
            return Vec::new();
        };

        let candidates: Vec<(RequestId, Extent)> = queue
            .range((Bound::Excluded(retired), Bound::Unbounded))
            .filter(|(_, entry)| entry.state() == RequestState::Held)
            .map(|(id, entry)| (*id, entry.extent))
            .collect();

        let mut promoted = Vec::new();
        for (id, extent) in candidates {
            if has_conflicting_predecessor(queue, id, &extent) {
                continue;
            }
            let Some(entry) = queue.get_mut(&id) else {
                continue;
            };
            if let Slot::Held(request) = std::mem::replace(&mut entry.slot, Slot::Dispatched) {
                promoted.push((id, request));
            }
        }

        self.held -= promoted.len();
        self.dispatched += promoted.len();
        promoted
    }
}

/// True if any entry submitted before `id` conflicts with `extent`.
fn has_conflicting_predecessor<B>(queue: &FileQueue<B>, id: RequestId, extent: &Extent) -> bool {
    queue
        .range(..id)
        .any(|(_, earlier)| earlier.extent.conflicts_with(extent))
}
