//! Unit and property tests for the conflict resolver.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use proptest::prelude::*;
use test_case::test_case;

use crate::{
    CompletionSink, ConflictResolver, Dispatched, Executor, Extent, FileId, Request, RequestId,
    RequestState, ResolverError,
};

// ============================================================================
// Test Doubles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Forwarded(RequestId, Extent),
    Reported(RequestId),
}

type EventLog = Rc<RefCell<Vec<Event>>>;

/// Executor that parks forwarded requests until the test completes them.
struct Parked {
    in_flight: Vec<Dispatched<Vec<u8>>>,
    events: EventLog,
}

impl Executor<Vec<u8>> for Parked {
    fn forward(&mut self, io: Dispatched<Vec<u8>>) {
        self.events
            .borrow_mut()
            .push(Event::Forwarded(io.id(), *io.extent()));
        self.in_flight.push(io);
    }
}

impl Parked {
    fn take(&mut self, id: RequestId) -> Dispatched<Vec<u8>> {
        let pos = self
            .in_flight
            .iter()
            .position(|io| io.id() == id)
            .unwrap_or_else(|| panic!("{id} is not in flight"));
        self.in_flight.remove(pos)
    }

    fn ids(&self) -> Vec<RequestId> {
        self.in_flight.iter().map(Dispatched::id).collect()
    }
}

struct Reports {
    done: Vec<RequestId>,
    events: EventLog,
}

impl CompletionSink<Vec<u8>> for Reports {
    fn report_done(&mut self, id: RequestId, _request: Request<Vec<u8>>) {
        self.events.borrow_mut().push(Event::Reported(id));
        self.done.push(id);
    }
}

type TestResolver = ConflictResolver<Vec<u8>, Parked, Reports>;

fn resolver() -> (TestResolver, EventLog) {
    let events = EventLog::default();
    let resolver = ConflictResolver::new(
        Parked {
            in_flight: Vec::new(),
            events: Rc::clone(&events),
        },
        Reports {
            done: Vec::new(),
            events: Rc::clone(&events),
        },
    );
    (resolver, events)
}

const FILE: FileId = FileId::new(0);

fn write(r: &mut TestResolver, offset: i64, data: &[u8]) -> RequestId {
    r.submit(Request::write(FILE, offset, data.len(), data.to_vec()))
        .unwrap()
}

fn read(r: &mut TestResolver, offset: i64, count: usize) -> RequestId {
    r.submit(Request::read(FILE, offset, count, vec![0; count]))
        .unwrap()
}

fn complete(r: &mut TestResolver, id: RequestId) {
    let io = r.executor_mut().take(id);
    r.on_completion(io).unwrap();
}

fn is_dispatched(r: &TestResolver, id: RequestId) -> bool {
    r.state(id) == Some(RequestState::Dispatched)
}

// ============================================================================
// Conflict Predicate
// ============================================================================

#[test_case(Extent::read(FILE, 0, 8), Extent::read(FILE, 0, 8), false; "two reads same range")]
#[test_case(Extent::write(FILE, 0, 8), Extent::read(FILE, 4, 8), true; "write then overlapping read")]
#[test_case(Extent::read(FILE, 4, 8), Extent::write(FILE, 0, 8), true; "read then overlapping write")]
#[test_case(Extent::write(FILE, 0, 8), Extent::write(FILE, 7, 1), true; "writes share last byte")]
#[test_case(Extent::write(FILE, 0, 3), Extent::write(FILE, 3, 3), false; "adjacent writes")]
#[test_case(Extent::write(FILE, 0, 26), Extent::read(FILE, 3, 9), true; "read inside write")]
#[test_case(Extent::write(FILE, 3, 20), Extent::read(FILE, 0, 26), true; "read covers write")]
#[test_case(Extent::write(FILE, 0, 3), Extent::write(FILE, 4096, 3), false; "distant writes")]
#[test_case(Extent::write(FILE, 0, 8), Extent::write(FileId::new(1), 0, 8), false; "different files")]
#[test_case(Extent::write(FILE, 0, 0), Extent::write(FILE, 0, 8), false; "empty write at start")]
#[test_case(Extent::write(FILE, 5, 0), Extent::write(FILE, 0, 10), false; "empty write inside")]
fn conflict_predicate(a: Extent, b: Extent, expected: bool) {
    assert_eq!(a.conflicts_with(&b), expected);
    assert_eq!(b.conflicts_with(&a), expected, "predicate must be symmetric");
}

#[test]
fn validate_rejects_negative_offset() {
    let extent = Extent::read(FILE, -1, 4);
    assert_eq!(
        extent.validate(),
        Err(ResolverError::NegativeOffset { offset: -1 })
    );
}

#[test]
fn validate_rejects_overflowing_range() {
    let extent = Extent::write(FILE, i64::MAX - 2, 3);
    assert_eq!(
        extent.validate(),
        Err(ResolverError::RangeOverflow {
            offset: i64::MAX - 2,
            count: 3
        })
    );
    assert!(Extent::write(FILE, i64::MAX - 3, 3).validate().is_ok());
}

#[test]
fn extent_display() {
    assert_eq!(Extent::read(FILE, 0, 3).to_string(), "read file=0 [0, 3)");
    assert_eq!(
        Extent::write(FileId::new(7), 4096, 8).to_string(),
        "write file=7 [4096, 4104)"
    );
}

#[test]
fn request_debug_omits_payload() {
    let request = Request::write(FILE, 16, 6, b"secret".to_vec());
    let rendered = format!("{request:?}");
    assert!(rendered.contains("offset: 16"));
    assert!(rendered.contains("count: 6"));
    assert!(!rendered.contains("115"), "payload bytes leaked: {rendered}");
}

// ============================================================================
// Submission
// ============================================================================

#[test]
fn non_overlapping_writes_dispatch_immediately() {
    let (mut r, _) = resolver();
    let w1 = write(&mut r, 0, b"foo");
    let w2 = write(&mut r, 4096, b"bar");

    assert!(is_dispatched(&r, w1));
    assert!(is_dispatched(&r, w2));
    assert_eq!(r.executor().ids(), vec![w1, w2]);
}

#[test]
fn reads_share_a_range() {
    let (mut r, _) = resolver();
    let r1 = read(&mut r, 0, 3);
    let r2 = read(&mut r, 0, 3);

    assert!(is_dispatched(&r, r1));
    assert!(is_dispatched(&r, r2));
    assert_eq!(r.held_count(), 0);
}

#[test]
fn same_range_on_different_files_does_not_block() {
    let (mut r, _) = resolver();
    let a = r
        .submit(Request::write(FileId::new(1), 0, 3, b"foo".to_vec()))
        .unwrap();
    let b = r
        .submit(Request::write(FileId::new(2), 0, 3, b"bar".to_vec()))
        .unwrap();

    assert!(is_dispatched(&r, a));
    assert!(is_dispatched(&r, b));
    assert_eq!(r.stats().files, 2);
}

#[test]
fn empty_request_never_waits() {
    let (mut r, _) = resolver();
    let w = write(&mut r, 0, b"abcdef");
    let empty = write(&mut r, 2, b"");
    let after = read(&mut r, 2, 0);

    assert!(is_dispatched(&r, w));
    assert!(is_dispatched(&r, empty));
    assert!(is_dispatched(&r, after));
}

#[test]
fn rejected_submission_leaves_no_trace() {
    let (mut r, events) = resolver();
    let result = r.submit(Request::read(FILE, -8, 4, vec![0; 4]));

    assert_eq!(result, Err(ResolverError::NegativeOffset { offset: -8 }));
    assert!(r.is_idle());
    assert_eq!(r.stats().submitted, 0);
    assert!(events.borrow().is_empty());
}

#[test]
fn ids_follow_submission_order() {
    let (mut r, _) = resolver();
    let a = write(&mut r, 0, b"a");
    let b = read(&mut r, 100, 1);
    let c = write(&mut r, 0, b"c");
    assert!(a < b && b < c);
}

// ============================================================================
// Completion and Promotion
// ============================================================================

#[test]
fn write_write_conflict_runs_in_order() {
    let (mut r, _) = resolver();
    let w1 = write(&mut r, 0, b"foo");
    let w2 = write(&mut r, 0, b"bar");
    let verify = read(&mut r, 0, 3);

    assert!(is_dispatched(&r, w1));
    assert_eq!(r.state(w2), Some(RequestState::Held));
    assert_eq!(r.state(verify), Some(RequestState::Held));

    complete(&mut r, w1);
    assert!(is_dispatched(&r, w2));
    assert_eq!(r.state(verify), Some(RequestState::Held));

    complete(&mut r, w2);
    assert!(is_dispatched(&r, verify));

    complete(&mut r, verify);
    assert!(r.is_idle());
    assert_eq!(r.sink().done, vec![w1, w2, verify]);
}

#[test]
fn read_before_write_is_not_overtaken() {
    let (mut r, _) = resolver();
    let initial = write(&mut r, 0, b"initial");
    let rd = read(&mut r, 0, 4);
    let w = write(&mut r, 0, b"something_else");

    complete(&mut r, initial);
    assert!(is_dispatched(&r, rd));
    assert_eq!(r.state(w), Some(RequestState::Held));

    complete(&mut r, rd);
    assert!(is_dispatched(&r, w));
}

#[test]
fn held_request_guards_its_place_in_line() {
    // b conflicts with a, c conflicts with b but not a. c must still wait
    // for b, even though nothing dispatched overlaps it.
    let (mut r, _) = resolver();
    let a = write(&mut r, 0, b"aaaa");
    let b = write(&mut r, 2, b"bbbbbb");
    let c = write(&mut r, 6, b"cccc");

    assert!(is_dispatched(&r, a));
    assert_eq!(r.state(b), Some(RequestState::Held));
    assert_eq!(r.state(c), Some(RequestState::Held));

    complete(&mut r, a);
    assert!(is_dispatched(&r, b));
    assert_eq!(r.state(c), Some(RequestState::Held));

    complete(&mut r, b);
    assert!(is_dispatched(&r, c));
}

#[test]
fn one_completion_releases_several_requests() {
    let (mut r, _) = resolver();
    let w = write(&mut r, 0, &[7; 100]);
    let r1 = read(&mut r, 0, 10);
    let r2 = read(&mut r, 50, 10);
    let r3 = read(&mut r, 5, 50);

    assert_eq!(r.held_count(), 3);
    complete(&mut r, w);

    assert_eq!(r.held_count(), 0);
    assert_eq!(r.executor().ids(), vec![r1, r2, r3]);
}

#[test]
fn promotion_skips_still_blocked_requests() {
    let (mut r, _) = resolver();
    let w1 = write(&mut r, 0, &[1; 10]);
    let w2 = write(&mut r, 100, &[2; 10]);
    let behind_w1 = read(&mut r, 0, 10);
    let behind_w2 = read(&mut r, 100, 10);

    complete(&mut r, w2);
    assert!(is_dispatched(&r, behind_w2));
    assert_eq!(r.state(behind_w1), Some(RequestState::Held));

    complete(&mut r, w1);
    assert!(is_dispatched(&r, behind_w1));
}

#[test]
fn completion_is_reported_before_promoted_request_is_forwarded() {
    let (mut r, events) = resolver();
    let w1 = write(&mut r, 0, b"foo");
    let w2 = write(&mut r, 0, b"bar");
    events.borrow_mut().clear();

    complete(&mut r, w1);

    let events = events.borrow();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Event::Reported(w1));
    assert!(matches!(events[1], Event::Forwarded(id, _) if id == w2));
}

#[test]
fn out_of_order_completion_of_independent_requests() {
    let (mut r, _) = resolver();
    let a = write(&mut r, 0, b"a");
    let b = write(&mut r, 10, b"b");
    let c = write(&mut r, 20, b"c");

    complete(&mut r, c);
    complete(&mut r, a);
    complete(&mut r, b);

    assert_eq!(r.sink().done, vec![c, a, b]);
    assert!(r.is_idle());
}

// ============================================================================
// Contract Violations
// ============================================================================

#[test]
fn completing_a_held_request_is_rejected() {
    let (mut r, _) = resolver();
    write(&mut r, 0, b"foo");
    let held = write(&mut r, 0, b"bar");

    let forged = Dispatched::new(held, Request::write(FILE, 0, 3, b"bar".to_vec()));
    assert_eq!(
        r.on_completion(forged),
        Err(ResolverError::NotDispatched { id: held })
    );
    assert_eq!(r.state(held), Some(RequestState::Held));
    assert_eq!(r.stats().completed, 0);
}

#[test]
fn completing_an_unknown_request_is_rejected() {
    let (mut r, _) = resolver();
    let forged = Dispatched::new(RequestId::new(42), Request::read(FILE, 0, 1, vec![0]));
    assert_eq!(
        r.on_completion(forged),
        Err(ResolverError::UnknownRequest {
            id: RequestId::new(42)
        })
    );
}

#[test]
fn token_from_another_resolver_is_rejected() {
    let (mut mine, _) = resolver();
    let (mut theirs, _) = resolver();
    let id = write(&mut mine, 0, b"mine");
    write(&mut theirs, 100, b"theirs");

    let foreign = theirs.executor_mut().take(id);
    assert_eq!(
        mine.on_completion(foreign),
        Err(ResolverError::UnknownRequest { id })
    );
    assert!(is_dispatched(&mine, id));
}

// ============================================================================
// Stats
// ============================================================================

#[test]
fn stats_track_outstanding_requests() {
    let (mut r, _) = resolver();
    let w = write(&mut r, 0, b"foo");
    read(&mut r, 0, 3);
    read(&mut r, 1, 1);
    write(&mut r, 4096, b"bar");

    let stats = r.stats();
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.held, 2);
    assert_eq!(stats.submitted, 4);
    assert_eq!(stats.held_high_water, 2);

    complete(&mut r, w);
    let stats = r.stats();
    assert_eq!(stats.dispatched, 3);
    assert_eq!(stats.held, 0);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.held_high_water, 2);
    assert_eq!(r.outstanding_count(), 3);
}

#[test]
fn closures_serve_as_callbacks() {
    let forwarded = RefCell::new(Vec::new());
    let reported = RefCell::new(Vec::new());
    let mut r = ConflictResolver::new(
        |io: Dispatched<Vec<u8>>| forwarded.borrow_mut().push(io),
        |id: RequestId, request: Request<Vec<u8>>| {
            reported.borrow_mut().push((id, request.into_buffer()));
        },
    );

    let w = r
        .submit(Request::write(FILE, 0, 3, b"foo".to_vec()))
        .unwrap();
    let io = forwarded.borrow_mut().pop().unwrap();
    r.on_completion(io).unwrap();

    assert_eq!(reported.borrow().as_slice(), &[(w, b"foo".to_vec())]);
}

// ============================================================================
// Property-Based Tests
// ============================================================================

/// Replays a trace and checks the two safety properties: nothing in flight
/// conflicts, and a request is forwarded only after every earlier
/// conflicting request has been reported done.
fn check_trace(submitted: &[Extent], events: &[Event]) -> Result<(), String> {
    let mut in_flight: Vec<(RequestId, Extent)> = Vec::new();
    let mut reported: HashSet<RequestId> = HashSet::new();

    for event in events {
        match *event {
            Event::Forwarded(id, extent) => {
                if let Some((other, _)) = in_flight.iter().find(|(_, e)| e.conflicts_with(&extent))
                {
                    return Err(format!("{id} forwarded while conflicting {other} in flight"));
                }
                let position = usize::try_from(id.as_u64()).unwrap();
                for (earlier, prior) in submitted[..position].iter().enumerate() {
                    let earlier = RequestId::new(earlier as u64);
                    if prior.conflicts_with(&extent) && !reported.contains(&earlier) {
                        return Err(format!("{id} forwarded before conflicting {earlier} finished"));
                    }
                }
                in_flight.push((id, extent));
            }
            Event::Reported(id) => {
                in_flight.retain(|(other, _)| *other != id);
                reported.insert(id);
            }
        }
    }
    Ok(())
}

/// Checks that every outstanding request is held exactly when an earlier
/// outstanding request conflicts with it.
fn check_held_iff_blocked(
    r: &TestResolver,
    submitted: &[(RequestId, Extent)],
) -> Result<(), String> {
    let outstanding: Vec<&(RequestId, Extent)> = submitted
        .iter()
        .filter(|(id, _)| r.state(*id).is_some())
        .collect();
    for (position, (id, extent)) in outstanding.iter().enumerate() {
        let blocked = outstanding[..position]
            .iter()
            .any(|(_, earlier)| earlier.conflicts_with(extent));
        let held = r.state(*id) == Some(RequestState::Held);
        if held != blocked {
            return Err(format!("{id} held={held} but blocked={blocked}"));
        }
    }
    Ok(())
}

fn extent_strategy() -> impl Strategy<Value = Extent> {
    (any::<bool>(), 0u64..2, 0i64..64, 0usize..16).prop_map(|(is_read, file, offset, count)| {
        if is_read {
            Extent::read(FileId::new(file), offset, count)
        } else {
            Extent::write(FileId::new(file), offset, count)
        }
    })
}

proptest! {
    /// Property: for any workload and completion order, no two conflicting
    /// requests are ever in flight together, conflicting requests run in
    /// submission order, and everything eventually completes.
    #[test]
    fn prop_random_schedules_are_safe_and_live(
        extents in prop::collection::vec(extent_strategy(), 1..40),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..40),
        drain in prop::collection::vec(any::<prop::sample::Index>(), 80),
    ) {
        let (mut r, events) = resolver();
        let mut picks = picks.into_iter();

        for extent in &extents {
            r.submit(Request::new(*extent, vec![0; extent.count])).unwrap();
            if let Some(pick) = picks.next() {
                let ids = r.executor().ids();
                if !ids.is_empty() {
                    complete(&mut r, ids[pick.index(ids.len())]);
                }
            }
        }

        let mut drain = drain.into_iter().cycle();
        while !r.is_idle() {
            let ids = r.executor().ids();
            prop_assert!(!ids.is_empty(), "requests held with nothing in flight");
            let pick = drain.next().unwrap();
            complete(&mut r, ids[pick.index(ids.len())]);
        }

        prop_assert_eq!(r.sink().done.len(), extents.len());
        let result = check_trace(&extents, &events.borrow());
        prop_assert!(result.is_ok(), "{}", result.unwrap_err());
    }

    /// Property: requests that conflict with nothing earlier are forwarded
    /// during submit.
    #[test]
    fn prop_unblocked_requests_dispatch_on_submit(
        extents in prop::collection::vec(extent_strategy(), 1..30),
    ) {
        let (mut r, _) = resolver();
        for (position, extent) in extents.iter().enumerate() {
            let id = r.submit(Request::new(*extent, vec![0; extent.count])).unwrap();
            let blocked = extents[..position].iter().any(|e| e.conflicts_with(extent));
            prop_assert_eq!(is_dispatched(&r, id), !blocked);
        }
    }

    /// Property: after every completion, a request is held exactly when an
    /// earlier outstanding request conflicts with it.
    #[test]
    fn prop_held_iff_blocked_after_every_completion(
        extents in prop::collection::vec(extent_strategy(), 1..30),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 60),
    ) {
        let (mut r, _) = resolver();
        let mut submitted = Vec::with_capacity(extents.len());
        for extent in &extents {
            let id = r.submit(Request::new(*extent, vec![0; extent.count])).unwrap();
            submitted.push((id, *extent));
        }

        let mut picks = picks.into_iter().cycle();
        while !r.is_idle() {
            let ids = r.executor().ids();
            prop_assert!(!ids.is_empty(), "requests held with nothing in flight");
            let pick = picks.next().unwrap();
            complete(&mut r, ids[pick.index(ids.len())]);

            let result = check_held_iff_blocked(&r, &submitted);
            prop_assert!(result.is_ok(), "{}", result.unwrap_err());
        }
    }
}
