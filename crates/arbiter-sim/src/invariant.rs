//! Invariant checkers over a simulation trace.
//!
//! # Available Checkers
//!
//! - [`ExclusiveDispatchChecker`]: no two conflicting requests in flight
//! - [`ConflictOrderChecker`]: conflicting requests are forwarded only after
//!   every earlier conflicting request has been reported done
//!
//! Both consume [`TraceEvent`]s one at a time; [`check_trace`] runs them over
//! a whole trace.

use std::collections::{BTreeMap, HashSet};

use arbiter_io::{Extent, RequestId};

use crate::{SimError, TraceEvent};

// ============================================================================
// Invariant Result
// ============================================================================

/// Result of an invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    /// The invariant holds.
    Ok,
    /// The invariant is violated.
    Violated {
        /// Name of the violated invariant.
        invariant: String,
        /// Description of the violation.
        message: String,
        /// Additional context.
        context: Vec<(String, String)>,
    },
}

impl InvariantResult {
    /// Returns true if the invariant holds.
    pub fn is_ok(&self) -> bool {
        matches!(self, InvariantResult::Ok)
    }

    /// Converts to a `SimError` if violated.
    pub fn into_error(self) -> Option<SimError> {
        match self {
            InvariantResult::Ok => None,
            InvariantResult::Violated {
                invariant, message, ..
            } => Some(SimError::InvariantViolation { invariant, message }),
        }
    }
}

/// Trait for invariant checkers.
pub trait InvariantChecker {
    /// Returns the name of this checker.
    fn name(&self) -> &'static str;

    /// Feeds the next trace event.
    fn observe(&mut self, event: &TraceEvent) -> InvariantResult;

    /// Resets the checker to its initial state.
    fn reset(&mut self);
}

// ============================================================================
// Exclusive Dispatch Checker
// ============================================================================

/// Verifies that no two requests in flight at the same time conflict.
#[derive(Debug, Default)]
pub struct ExclusiveDispatchChecker {
    in_flight: BTreeMap<RequestId, Extent>,
    forwards_checked: u64,
}

impl ExclusiveDispatchChecker {
    /// Creates a checker with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many forwards have been observed.
    pub fn forwards_checked(&self) -> u64 {
        self.forwards_checked
    }
}

impl InvariantChecker for ExclusiveDispatchChecker {
    fn name(&self) -> &'static str {
        "exclusive_dispatch"
    }

    fn observe(&mut self, event: &TraceEvent) -> InvariantResult {
        match *event {
            TraceEvent::Forwarded { id, extent } => {
                self.forwards_checked += 1;
                let clash = self
                    .in_flight
                    .iter()
                    .find(|(_, running)| running.conflicts_with(&extent));
                if let Some((other, running)) = clash {
                    return InvariantResult::Violated {
                        invariant: self.name().to_string(),
                        message: format!("{id} forwarded while conflicting {other} in flight"),
                        context: vec![
                            ("forwarded".to_string(), extent.to_string()),
                            ("in_flight".to_string(), running.to_string()),
                        ],
                    };
                }
                if self.in_flight.insert(id, extent).is_some() {
                    return InvariantResult::Violated {
                        invariant: self.name().to_string(),
                        message: format!("{id} forwarded twice"),
                        context: vec![("extent".to_string(), extent.to_string())],
                    };
                }
            }
            TraceEvent::Reported { id } => {
                self.in_flight.remove(&id);
            }
            TraceEvent::Submitted { .. } => {}
        }
        InvariantResult::Ok
    }

    fn reset(&mut self) {
        self.in_flight.clear();
        self.forwards_checked = 0;
    }
}

// ============================================================================
// Conflict Order Checker
// ============================================================================

/// Verifies that if A conflicts with B and was submitted first, A has been
/// reported done before B is forwarded.
#[derive(Debug, Default)]
pub struct ConflictOrderChecker {
    submitted: BTreeMap<RequestId, Extent>,
    reported: HashSet<RequestId>,
}

impl ConflictOrderChecker {
    /// Creates a checker with no submissions seen.
    pub fn new() -> Self {
        Self::default()
    }
}

impl InvariantChecker for ConflictOrderChecker {
    fn name(&self) -> &'static str {
        "conflict_order"
    }

    fn observe(&mut self, event: &TraceEvent) -> InvariantResult {
        match *event {
            TraceEvent::Submitted { id, extent } => {
                self.submitted.insert(id, extent);
            }
            TraceEvent::Forwarded { id, extent } => {
                let overtaken = self.submitted.range(..id).find(|(earlier, prior)| {
                    prior.conflicts_with(&extent) && !self.reported.contains(*earlier)
                });
                if let Some((earlier, prior)) = overtaken {
                    return InvariantResult::Violated {
                        invariant: self.name().to_string(),
                        message: format!("{id} forwarded before conflicting {earlier} finished"),
                        context: vec![
                            ("forwarded".to_string(), extent.to_string()),
                            ("earlier".to_string(), prior.to_string()),
                        ],
                    };
                }
            }
            TraceEvent::Reported { id } => {
                self.reported.insert(id);
            }
        }
        InvariantResult::Ok
    }

    fn reset(&mut self) {
        self.submitted.clear();
        self.reported.clear();
    }
}

/// Runs every checker over `events`, stopping at the first violation.
pub fn check_trace(events: &[TraceEvent]) -> InvariantResult {
    let mut checkers: Vec<Box<dyn InvariantChecker>> = vec![
        Box::new(ExclusiveDispatchChecker::new()),
        Box::new(ConflictOrderChecker::new()),
    ];
    for event in events {
        for checker in &mut checkers {
            let result = checker.observe(event);
            if !result.is_ok() {
                return result;
            }
        }
    }
    InvariantResult::Ok
}
