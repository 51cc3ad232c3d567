//! CSTR Process Simulator - Main Entry Point
//!
//! Connects the Kafka channels, then repeatedly simulates the reactor:
//! each run walks the default time grid from the current seed state,
//! and the next run is seeded from where the previous one ended.

use std::process;

use log::{error, info};
use ndarray::Array1;

use cstr_simulator::broker::{BrokerConfig, KafkaCommandSource, KafkaTelemetrySink};
use cstr_simulator::{
    CommandReceiver, CstrState, FeedConditions, RetryPolicy, Simulation, StepIntegrator,
    TelemetryPublisher,
};

/// Default time grid: 10 minutes in 300 intervals.
const GRID_END: f64 = 10.0;
const GRID_POINTS: usize = 301;

/// Steady-state cooling jacket temperature [K], the schedule seed.
const STEADY_STATE_COOLANT_TEMP: f64 = 300.0;

/// Steady-state reactor conditions for a 300 K jacket.
const INITIAL_STATE: CstrState = CstrState {
    ca: 0.877_252_946_080_97,
    temp: 324.475_443_431_599,
};

const FEED: FeedConditions = FeedConditions { temp: 350.0, ca: 1.0 };

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        error!("fatal: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = BrokerConfig::from_env()?;

    // Channel handles are process-wide: connected once, held for the
    // process lifetime, dropped on shutdown.
    let sink = KafkaTelemetrySink::connect(&config)?;
    let source = KafkaCommandSource::connect(&config)?;
    let mut publisher = TelemetryPublisher::new(sink);
    let mut receiver = CommandReceiver::new(source, RetryPolicy::default());

    let grid = Array1::linspace(0.0, GRID_END, GRID_POINTS);
    let mut state = INITIAL_STATE;

    for iteration in 1..=config.run_count {
        info!("starting simulation run {iteration}/{}", config.run_count);

        let mut schedule = Array1::from_elem(grid.len(), STEADY_STATE_COOLANT_TEMP);
        let mut simulation =
            Simulation::new(StepIntegrator::default(), &mut publisher, &mut receiver);
        let trajectory = simulation.run(&grid, &mut schedule, state, FEED)?;

        // Seed the next run from where this one ended.
        state = trajectory.final_state();
        info!(
            "simulation run {iteration} completed: Ca = {:.6}, T = {:.3}",
            state.ca, state.temp
        );
    }

    info!("completed execution, exiting");
    Ok(())
}
