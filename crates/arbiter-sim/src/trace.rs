//! Shared event trace and the completion sink that feeds it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use arbiter_io::{CompletionSink, Extent, Request, RequestId};

/// One observable step of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// `submit` returned this id.
    Submitted { id: RequestId, extent: Extent },
    /// The resolver forwarded the request to the disk.
    Forwarded { id: RequestId, extent: Extent },
    /// The resolver reported the request done.
    Reported { id: RequestId },
}

/// Append-only event log shared by the disk, the completion sink and the
/// driver.
///
/// Cloning yields another handle to the same log. Single-threaded by
/// construction, like the resolver it observes.
#[derive(Debug, Clone, Default)]
pub struct Trace(Rc<RefCell<Vec<TraceEvent>>>);

impl Trace {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event`.
    pub fn record(&self, event: TraceEvent) {
        self.0.borrow_mut().push(event);
    }

    /// Copies the events recorded so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.0.borrow().clone()
    }

    /// Returns the number of recorded events.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Completion sink that keeps every finished request for inspection.
#[derive(Debug)]
pub struct CompletionLog<B> {
    done: BTreeMap<RequestId, Request<B>>,
    order: Vec<RequestId>,
    trace: Trace,
}

impl<B> CompletionLog<B> {
    /// Creates an empty log that records reports into `trace`.
    pub fn new(trace: Trace) -> Self {
        Self {
            done: BTreeMap::new(),
            order: Vec::new(),
            trace,
        }
    }

    /// Returns true once `id` has been reported done.
    pub fn is_done(&self, id: RequestId) -> bool {
        self.done.contains_key(&id)
    }

    /// Returns the finished request for `id`, buffer included.
    pub fn get(&self, id: RequestId) -> Option<&Request<B>> {
        self.done.get(&id)
    }

    /// Ids in the order they were reported.
    pub fn order(&self) -> &[RequestId] {
        &self.order
    }
}

impl<B> CompletionSink<B> for CompletionLog<B> {
    fn report_done(&mut self, id: RequestId, request: Request<B>) {
        self.trace.record(TraceEvent::Reported { id });
        self.order.push(id);
        self.done.insert(id, request);
    }
}
