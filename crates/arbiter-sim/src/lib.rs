//! # arbiter-sim: Deterministic simulation for the conflict resolver
//!
//! Drives a [`ConflictResolver`](arbiter_io::ConflictResolver) against an
//! in-memory disk whose I/O only happens when the test says so. That makes
//! every interleaving of submissions and completions reproducible and lets
//! us check data, not just bookkeeping.
//!
//! ```text
//! ┌──────────────┐  submit   ┌──────────────────┐  forward  ┌─────────┐
//! │  SimDriver   │ ────────▶ │ ConflictResolver │ ────────▶ │ SimDisk │
//! │ (permit ids) │ ◀──────── │                  │ ◀──────── │MemStore │
//! └──────┬───────┘  report   └──────────────────┘  complete └─────────┘
//!        │                                                      │
//!        └──────────────────── Trace (shared) ◀─────────────────┘
//! ```
//!
//! - [`SimDriver`]: submit reads/writes, permit individual completions,
//!   check what each read returned
//! - [`invariant`]: trace checkers for exclusive dispatch and conflict order
//! - [`SerialOracle`]: the same operations applied one at a time, in order
//! - [`run_simulation`]: seeded random workload end to end

mod config;
mod disk;
mod driver;
mod error;
pub mod invariant;
mod oracle;
mod simulation;
mod store;
mod trace;
mod workload;

pub use config::SimConfig;
pub use disk::SimDisk;
pub use driver::{SimDriver, SimResolver};
pub use error::SimError;
pub use invariant::{InvariantChecker, InvariantResult};
pub use oracle::SerialOracle;
pub use simulation::{SimReport, run_simulation};
pub use store::MemStore;
pub use trace::{CompletionLog, Trace, TraceEvent};
pub use workload::{Op, generate_workload};
