//! CSTR Process Simulator Library
//!
//! Closed-loop simulation of a continuously stirred tank reactor: the
//! reactor ODEs are integrated one time-grid interval at a time, each
//! step's measurements are published to the control system over a
//! message bus, and the loop blocks on an updated cooling command
//! before advancing.

pub mod broker;
pub mod channel;
pub mod command;
pub mod integrator;
pub mod model;
pub mod simulation;
pub mod telemetry;

pub use command::{CommandOutcome, CommandReceiver, RetryPolicy};
pub use integrator::StepIntegrator;
pub use model::{CstrState, FeedConditions};
pub use simulation::{Simulation, SimulationError, Trajectory};
pub use telemetry::TelemetryPublisher;
