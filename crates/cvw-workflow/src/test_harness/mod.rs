//! Randomized workload driver for the engine

/// Seeded workload generator and invariant checks
pub mod simulator;

pub use simulator::{
    run_simulator, SimulatedOperation, SimulatorConfig, SimulatorReport, SimulatorStats, Violation,
};
