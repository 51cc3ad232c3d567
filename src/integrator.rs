//! Single-interval ODE integration
//!
//! Advances the reactor state across one time-grid interval by driving
//! an adaptive Dormand-Prince 5(4) stepper. The solver is treated as a
//! black box: callers hand in a start state and a span and get back the
//! end state, never the solver's internal substeps.

use std::{cell::Cell, rc::Rc};

use log::trace;
use ode_solvers::{dop_shared::IntegrationError, Dopri5, SVector, System};
use thiserror::Error;

use crate::model::{self, CstrState, FeedConditions};

type StateVector = SVector<f64, 2>;

/// Error returned by [`StepIntegrator::advance`].
#[derive(Debug, Error)]
pub enum StepError {
    /// The temperature collapsed to a non-positive value mid-span,
    /// where the reactor model is undefined. Fatal to the run: the
    /// physics past this point would be silently wrong.
    #[error("reactor temperature left the valid domain near t = {t:.6}")]
    DomainViolation { t: f64 },

    /// The underlying stepper failed to converge.
    #[error(transparent)]
    Solver(#[from] IntegrationError),

    /// The stepper finished but the end state is not finite.
    #[error("integration produced a non-finite state: Ca = {ca}, T = {temp}")]
    NonFiniteState { ca: f64, temp: f64 },
}

/// Adapts the reactor model to the stepper's system interface.
///
/// Control input and feed conditions are frozen for the span. The first
/// evaluation outside the model's domain is recorded in a shared cell;
/// from then on the adapter reports NaN derivatives and `solout` stops
/// the stepper.
struct CstrOde {
    coolant_temp: f64,
    feed: FeedConditions,
    domain_violation: Rc<Cell<Option<f64>>>,
}

impl System<f64, StateVector> for CstrOde {
    fn system(&self, t: f64, y: &StateVector, dy: &mut StateVector) {
        let state = CstrState { ca: y[0], temp: y[1] };

        if state.temp <= 0.0 {
            if self.domain_violation.get().is_none() {
                self.domain_violation.set(Some(t));
            }
            *dy = StateVector::from_element(f64::NAN);
            return;
        }

        let d = model::rates(&state, self.coolant_temp, &self.feed);
        dy[0] = d.dca_dt;
        dy[1] = d.dtemp_dt;
    }

    fn solout(&mut self, _t: f64, _y: &StateVector, _dy: &StateVector) -> bool {
        // Stop integrating once the model has left its domain.
        self.domain_violation.get().is_some()
    }
}

/// Advances a [`CstrState`] across one time interval.
#[derive(Debug, Clone, Copy)]
pub struct StepIntegrator {
    /// Relative error tolerance for the adaptive stepper.
    pub rel_tol: f64,
    /// Absolute error tolerance for the adaptive stepper.
    pub abs_tol: f64,
}

impl Default for StepIntegrator {
    fn default() -> Self {
        Self {
            rel_tol: 1e-8,
            abs_tol: 1e-8,
        }
    }
}

impl StepIntegrator {
    /// Solve the reactor ODEs over `[t_start, t_end]` with the control
    /// input and feed held constant, returning the state at `t_end`.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::DomainViolation`] if the temperature became
    /// non-positive at any evaluation point (checked before solver
    /// errors: a NaN-poisoned stage can also abort the stepper), and
    /// [`StepError::Solver`] or [`StepError::NonFiniteState`] if the
    /// stepper itself failed or returned a corrupted state.
    pub fn advance(
        &self,
        state: CstrState,
        span: (f64, f64),
        coolant_temp: f64,
        feed: &FeedConditions,
    ) -> Result<CstrState, StepError> {
        let (t_start, t_end) = span;

        if !state.ca.is_finite() || !state.temp.is_finite() {
            return Err(StepError::NonFiniteState { ca: state.ca, temp: state.temp });
        }
        if state.temp <= 0.0 {
            return Err(StepError::DomainViolation { t: t_start });
        }

        let domain_violation = Rc::new(Cell::new(None));
        let system = CstrOde {
            coolant_temp,
            feed: *feed,
            domain_violation: Rc::clone(&domain_violation),
        };

        let y_start = StateVector::new(state.ca, state.temp);
        let mut stepper = Dopri5::new(
            system,
            t_start,
            t_end,
            t_end - t_start,
            y_start,
            self.rel_tol,
            self.abs_tol,
        );

        let outcome = stepper.integrate();

        if let Some(t) = domain_violation.get() {
            return Err(StepError::DomainViolation { t });
        }
        let stats = outcome?;

        let y_end = *stepper
            .y_out()
            .last()
            .expect("stepper produced no output states");
        let end = CstrState { ca: y_end[0], temp: y_end[1] };

        if !end.ca.is_finite() || !end.temp.is_finite() {
            return Err(StepError::NonFiniteState { ca: end.ca, temp: end.temp });
        }
        if end.temp <= 0.0 {
            return Err(StepError::DomainViolation { t: t_end });
        }

        trace!(
            "integrated [{t_start}, {t_end}]: Ca = {:.6}, T = {:.3} ({} evaluations)",
            end.ca,
            end.temp,
            stats.num_eval
        );

        Ok(end)
    }
}
