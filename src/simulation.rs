//! Closed-loop simulation engine
//!
//! Drives the time grid one interval at a time: integrate, publish the
//! new measurements, block for a control command, fold the command into
//! the schedule, carry the end state forward. One full cycle per grid
//! point; the external controller closes the loop over the message bus.

use log::{debug, error, info};
use ndarray::Array1;
use thiserror::Error;

use crate::channel::{ChannelError, CommandSource, TelemetrySink};
use crate::command::{CommandOutcome, CommandReceiver};
use crate::integrator::{StepError, StepIntegrator};
use crate::model::{CstrState, FeedConditions};
use crate::telemetry::{TelemetryError, TelemetryPublisher};

/// Error returned by [`Simulation::run`].
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("time grid is empty")]
    EmptyGrid,

    #[error("control schedule has {schedule} entries but the time grid has {grid}")]
    ScheduleMismatch { schedule: usize, grid: usize },

    #[error("time grid is not strictly increasing at index {index}")]
    NonMonotonicGrid { index: usize },

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Per-run record of the simulated profiles.
///
/// The driver reseeds the next run from the final state; everything
/// else has already been published step by step.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// Time points of the grid [min]
    pub time: Array1<f64>,
    /// Concentration of A at each grid point [mol/L]
    pub ca: Array1<f64>,
    /// Reactor temperature at each grid point [K]
    pub temp: Array1<f64>,
}

impl Trajectory {
    /// State at the last grid point.
    pub fn final_state(&self) -> CstrState {
        let last = self.time.len() - 1;
        CstrState {
            ca: self.ca[last],
            temp: self.temp[last],
        }
    }
}

/// The closed-loop orchestrator.
///
/// Publisher and receiver are process-wide collaborators passed in by
/// the driver, not owned here; the integrator is cheap per-run state.
pub struct Simulation<'a, S: TelemetrySink, C: CommandSource> {
    integrator: StepIntegrator,
    publisher: &'a mut TelemetryPublisher<S>,
    receiver: &'a mut CommandReceiver<C>,
}

impl<'a, S: TelemetrySink, C: CommandSource> Simulation<'a, S, C> {
    pub fn new(
        integrator: StepIntegrator,
        publisher: &'a mut TelemetryPublisher<S>,
        receiver: &'a mut CommandReceiver<C>,
    ) -> Self {
        Self {
            integrator,
            publisher,
            receiver,
        }
    }

    /// Simulate the reactor across the whole grid.
    ///
    /// The step from `t_i` to `t_{i+1}` is driven by `schedule[i+1]` —
    /// the *next* grid point's control input advances the state *to*
    /// that point. When a command is accepted after step `i`, it lands
    /// in `schedule[i+1]` and therefore takes effect on the next
    /// lookup, never retroactively on the step just computed. Slot 0
    /// is the seed value and is never written.
    ///
    /// On [`CommandOutcome::Exhausted`] the slot is left as scheduled
    /// ("hold last scheduled value" policy).
    ///
    /// # Errors
    ///
    /// Aborts on integration failure, channel transport failure, or a
    /// malformed grid/schedule. A non-finite telemetry rejection is
    /// logged and the run continues.
    pub fn run(
        &mut self,
        grid: &Array1<f64>,
        schedule: &mut Array1<f64>,
        initial: CstrState,
        feed: FeedConditions,
    ) -> Result<Trajectory, SimulationError> {
        let n = grid.len();
        if n == 0 {
            return Err(SimulationError::EmptyGrid);
        }
        if schedule.len() != n {
            return Err(SimulationError::ScheduleMismatch {
                schedule: schedule.len(),
                grid: n,
            });
        }
        if let Some(index) = (1..n).find(|&i| grid[i] <= grid[i - 1]) {
            return Err(SimulationError::NonMonotonicGrid { index });
        }

        let mut ca = Array1::from_elem(n, initial.ca);
        let mut temp = Array1::from_elem(n, initial.temp);
        let mut state = initial;

        for i in 0..n - 1 {
            let span = (grid[i], grid[i + 1]);
            let coolant_temp = schedule[i + 1];

            state = self.integrator.advance(state, span, coolant_temp, &feed)?;
            ca[i + 1] = state.ca;
            temp[i + 1] = state.temp;
            debug!(
                "step {i}: Ca = {:.6}, T = {:.3}, Tc = {coolant_temp}",
                state.ca, state.temp
            );

            if let Err(err) = self.publisher.publish(&state) {
                match err {
                    TelemetryError::NonFinite { .. } => {
                        error!("dropping telemetry for step {i}: {err}");
                    }
                    other => return Err(other.into()),
                }
            }

            match self.receiver.receive()? {
                CommandOutcome::Accepted(tc) => {
                    info!("updating scheduled control input {} to Tc = {tc}", i + 1);
                    schedule[i + 1] = tc;
                }
                CommandOutcome::Exhausted => {
                    // Hold-last-scheduled-value policy: the slot keeps
                    // the value the step was just driven with.
                    error!("no valid control command for step {i}, holding last scheduled value");
                }
            }
        }

        Ok(Trajectory {
            time: grid.clone(),
            ca,
            temp,
        })
    }
}
