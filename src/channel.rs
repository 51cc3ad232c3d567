//! Channel seams for the external control system
//!
//! The simulation core never talks to the broker directly. It is handed
//! one outbound and one inbound channel as collaborator handles; the
//! Kafka-backed implementations live in [`crate::broker`], and tests
//! substitute scripted ones.

use std::time::Duration;

use thiserror::Error;

/// Transport failure on a channel.
///
/// Channel handles are process-wide resources acquired at startup; a
/// transport failure is outside the simulation's recovery policy and
/// aborts the run.
#[derive(Debug, Error)]
#[error("channel transport failure: {message}")]
pub struct ChannelError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ChannelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Outbound channel for telemetry payloads.
///
/// `send` is synchronous: it returns only once the message has been
/// accepted by the transport (for the Kafka adapter, acknowledged by
/// the broker).
pub trait TelemetrySink {
    fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError>;
}

/// Inbound channel for control-command payloads.
pub trait CommandSource {
    /// Wait up to `timeout` for the next raw payload.
    ///
    /// `Ok(None)` means the timeout elapsed with no message; payload
    /// validation is the receiver's job, not the channel's.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError>;
}
