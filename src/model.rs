//! CSTR Reactor Model
//!
//! Dynamics of a continuously stirred tank reactor running a single
//! irreversible first-order reaction A -> B. The state is the
//! concentration of A and the reactor temperature; the manipulated
//! variable is the cooling jacket temperature.
//!
//! This module is purely the differential equation: no I/O, no mutable
//! state. Integration lives in [`crate::integrator`].

/// Physical and engineering constants for the reactor
///
/// These are plant parameters, fixed at compile time.
pub mod constants {
    /// Volumetric feed flow rate [L/min]
    pub const FLOW_RATE: f64 = 100.0;
    /// Reactor volume [L]
    pub const VOLUME: f64 = 100.0;
    /// Density of the reacting mixture [g/L]
    pub const DENSITY: f64 = 1000.0;
    /// Heat capacity of the reacting mixture [J/(g*K)]
    pub const HEAT_CAPACITY: f64 = 0.239;
    /// Heat of reaction for A -> B [J/mol]
    pub const HEAT_OF_REACTION: f64 = 5.0e4;
    /// Activation energy over the gas constant, E/R [K]
    pub const ACTIVATION_OVER_R: f64 = 8750.0;
    /// Arrhenius pre-exponential factor [1/min]
    pub const PRE_EXPONENTIAL: f64 = 7.2e10;
    /// Heat-transfer coefficient times exchange area, U*A [J/(min*K)]
    pub const HEAT_TRANSFER_AREA: f64 = 5.0e4;
}

/// State of the reactor at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CstrState {
    /// Concentration of species A [mol/L]
    pub ca: f64,
    /// Reactor temperature [K]
    pub temp: f64,
}

/// Feed conditions, fixed for the duration of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedConditions {
    /// Feed temperature [K]
    pub temp: f64,
    /// Feed concentration of A [mol/L]
    pub ca: f64,
}

/// Instantaneous rate of change of the state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Derivative {
    /// dCa/dt [mol/(L*min)]
    pub dca_dt: f64,
    /// dT/dt [K/min]
    pub dtemp_dt: f64,
}

/// Evaluate the reactor dynamics at a given state.
///
/// `coolant_temp` is the cooling jacket temperature [K], held constant
/// by the caller over an integration span (zero-order hold).
///
/// Undefined for `state.temp <= 0`: the Arrhenius term divides by the
/// absolute temperature. The integrator guards the domain and never
/// calls this outside it.
pub fn rates(state: &CstrState, coolant_temp: f64, feed: &FeedConditions) -> Derivative {
    use constants::*;

    // Arrhenius reaction rate for A
    let ra = PRE_EXPONENTIAL * (-ACTIVATION_OVER_R / state.temp).exp() * state.ca;

    let dca_dt = FLOW_RATE / VOLUME * (feed.ca - state.ca) - ra;
    let dtemp_dt = FLOW_RATE / VOLUME * (feed.temp - state.temp)
        + HEAT_OF_REACTION / (DENSITY * HEAT_CAPACITY) * ra
        + HEAT_TRANSFER_AREA / VOLUME / DENSITY / HEAT_CAPACITY * (coolant_temp - state.temp);

    Derivative { dca_dt, dtemp_dt }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Nominal operating point: steady state for a 300 K jacket.
    const STEADY_STATE: CstrState = CstrState {
        ca: 0.877_252_946_080_97,
        temp: 324.475_443_431_599,
    };
    const FEED: FeedConditions = FeedConditions { temp: 350.0, ca: 1.0 };

    #[test]
    fn derivatives_vanish_at_steady_state() {
        let d = rates(&STEADY_STATE, 300.0, &FEED);

        assert_abs_diff_eq!(d.dca_dt, 0.0, epsilon = 1e-2);
        assert_abs_diff_eq!(d.dtemp_dt, 0.0, epsilon = 1e-1);
    }

    #[test]
    fn warmer_jacket_heats_the_reactor() {
        let cold = rates(&STEADY_STATE, 290.0, &FEED);
        let hot = rates(&STEADY_STATE, 310.0, &FEED);

        assert!(hot.dtemp_dt > cold.dtemp_dt);
    }

    #[test]
    fn reaction_consumes_a_faster_at_higher_temperature() {
        let warm = CstrState { temp: 340.0, ..STEADY_STATE };

        let base = rates(&STEADY_STATE, 300.0, &FEED);
        let accelerated = rates(&warm, 300.0, &FEED);

        assert!(accelerated.dca_dt < base.dca_dt);
    }

    #[test]
    fn inputs_are_untouched() {
        let state = STEADY_STATE;
        let feed = FEED;
        let _ = rates(&state, 300.0, &feed);

        assert_eq!(state, STEADY_STATE);
        assert_eq!(feed, FEED);
    }
}
