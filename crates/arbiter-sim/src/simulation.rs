//! End-to-end randomized run.

use arbiter_io::FileId;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::{SerialOracle, SimConfig, SimDriver, SimError, generate_workload};

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimReport {
    pub seed: u64,
    pub requests: usize,
    pub reads_verified: usize,
    pub held_high_water: usize,
    pub max_in_flight: usize,
    pub trace_events: usize,
}

/// Runs one seeded simulation.
///
/// Generates a workload, submits it with completions interleaved at random,
/// drains, then checks every read and the final file contents against the
/// serial oracle, and the trace against every invariant checker.
pub fn run_simulation(config: &SimConfig) -> Result<SimReport, SimError> {
    config.validate()?;
    let mut rng = SmallRng::seed_from_u64(config.seed);

    let ops = generate_workload(config, &mut rng);
    let mut oracle = SerialOracle::new();
    let expected = ops
        .iter()
        .map(|op| oracle.apply(op))
        .collect::<Result<Vec<_>, _>>()?;

    let mut driver = SimDriver::new();
    let mut ids = Vec::with_capacity(ops.len());
    for op in &ops {
        ids.push(driver.submit(op.to_request())?);

        while driver.in_flight_count() >= config.max_in_flight {
            driver.permit_random(&mut rng)?;
        }
        if driver.in_flight_count() > 0 && rng.gen_bool(config.completion_probability) {
            driver.permit_random(&mut rng)?;
        }
    }
    driver.drain(&mut rng)?;

    let mut reads_verified = 0;
    for (id, expected) in ids.iter().zip(&expected) {
        if let Some(bytes) = expected {
            driver.expect_read(*id, bytes)?;
            reads_verified += 1;
        }
    }
    driver.check_invariants()?;

    let disk = driver.resolver().executor().store();
    for file in (0..config.files).map(FileId::new) {
        if disk.contents(file) != oracle.store().contents(file) {
            return Err(SimError::InvariantViolation {
                invariant: "final_contents".to_string(),
                message: format!("file {file} differs from serial execution"),
            });
        }
    }

    let stats = driver.resolver().stats();
    let report = SimReport {
        seed: config.seed,
        requests: ops.len(),
        reads_verified,
        held_high_water: stats.held_high_water,
        max_in_flight: driver.resolver().executor().max_in_flight(),
        trace_events: driver.trace().len(),
    };
    debug!(?report, "simulation finished");
    info!(
        seed = report.seed,
        requests = report.requests,
        reads = report.reads_verified,
        "simulation passed"
    );
    Ok(report)
}
