//! Telemetry publication
//!
//! Validates a finished step's observable outputs, serializes them and
//! emits them on the outbound channel. The first successful emission in
//! the process lifetime also creates the readiness marker file that
//! external orchestration watches for liveness.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::{ChannelError, TelemetrySink};
use crate::model::CstrState;

/// Well-known path of the readiness marker.
pub const READY_MARKER_PATH: &str = "/healthcheck";

/// Wire format of one telemetry message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    #[serde(rename = "Ca")]
    pub ca: f64,
    #[serde(rename = "Reactor_Temperature")]
    pub reactor_temperature: f64,
}

/// Error returned by [`TelemetryPublisher::publish`].
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The measurements are not publishable. Recoverable: the caller
    /// logs it and the simulation continues without emitting.
    #[error("refusing to publish non-finite measurements: Ca = {ca}, T = {temp}")]
    NonFinite { ca: f64, temp: f64 },

    #[error("telemetry encoding failed")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Publishes per-step measurements on the outbound channel.
pub struct TelemetryPublisher<S: TelemetrySink> {
    sink: S,
    marker_path: PathBuf,
}

impl<S: TelemetrySink> TelemetryPublisher<S> {
    pub fn new(sink: S) -> Self {
        Self::with_marker_path(sink, READY_MARKER_PATH)
    }

    /// Use a non-default readiness marker location.
    pub fn with_marker_path(sink: S, marker_path: impl Into<PathBuf>) -> Self {
        Self {
            sink,
            marker_path: marker_path.into(),
        }
    }

    /// Consume the publisher, giving the channel handle back.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Serialize and emit the state's observable quantities.
    ///
    /// Nothing is sent unless both values are finite. The send is
    /// synchronous; once it returns the message has been acknowledged
    /// by the transport, and the readiness marker exists.
    pub fn publish(&mut self, state: &CstrState) -> Result<(), TelemetryError> {
        if !state.ca.is_finite() || !state.temp.is_finite() {
            return Err(TelemetryError::NonFinite {
                ca: state.ca,
                temp: state.temp,
            });
        }

        let sample = TelemetrySample {
            ca: state.ca,
            reactor_temperature: state.temp,
        };
        let payload = serde_json::to_vec(&sample)?;
        self.sink.send(&payload)?;
        info!(
            "published telemetry: Ca = {:.6}, T = {:.3}",
            sample.ca, sample.reactor_temperature
        );

        self.touch_ready_marker();
        Ok(())
    }

    /// Create the readiness marker once the first message is out.
    ///
    /// Skipped when the marker already exists, so repeated publications
    /// never recreate it. Failure to write the marker is not a publish
    /// failure.
    fn touch_ready_marker(&self) {
        let path: &Path = &self.marker_path;
        if path.exists() {
            return;
        }
        match fs::write(path, b"ready") {
            Ok(()) => info!("created readiness marker at {}", path.display()),
            Err(err) => warn!("could not create readiness marker at {}: {err}", path.display()),
        }
    }
}
