//! Callbacks connecting the resolver to its environment.
//!
//! The resolver calls outward through two capabilities supplied at
//! construction: an [`Executor`] that runs dispatched I/O, and a
//! [`CompletionSink`] that hears about finished requests. Closures work for
//! both through the blanket impls below.

use crate::{Dispatched, Request, RequestId};

/// Runs dispatched requests.
///
/// Every token passed to [`forward`](Self::forward) must eventually be handed
/// back to [`ConflictResolver::on_completion`](crate::ConflictResolver::on_completion)
/// exactly once. Completions may arrive in any order. A request that failed
/// at the device is still completed; the resolver does not look at results.
///
/// `forward` is called while the resolver is mid-update, so implementations
/// must queue the work rather than complete it re-entrantly.
pub trait Executor<B> {
    fn forward(&mut self, io: Dispatched<B>);
}

/// Receives requests back once the resolver has finished with them.
///
/// Called exactly once per request, after the ledger has been updated, with
/// ownership of the request (and its buffer) returned to the caller.
pub trait CompletionSink<B> {
    fn report_done(&mut self, id: RequestId, request: Request<B>);
}

impl<B, F> Executor<B> for F
where
    F: FnMut(Dispatched<B>),
{
    fn forward(&mut self, io: Dispatched<B>) {
        self(io);
    }
}

impl<B, F> CompletionSink<B> for F
where
    F: FnMut(RequestId, Request<B>),
{
    fn report_done(&mut self, id: RequestId, request: Request<B>) {
        self(id, request);
    }
}
