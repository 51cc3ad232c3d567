//! Control-command reception
//!
//! Blocks on the inbound channel for a new cooling jacket temperature,
//! under a bounded retry/timeout policy: an outer attempt counter and
//! an inner poll that runs until the channel has been idle for a bound.
//! The policy guarantees the call always returns, whether or not a
//! valid command ever arrives.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::channel::{ChannelError, CommandSource};

/// Result of one receive cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandOutcome {
    /// A structurally valid, finite control value arrived.
    Accepted(f64),
    /// Every attempt ran out without a valid value. Not an error: the
    /// caller proceeds with the control input already scheduled.
    Exhausted,
}

/// Why a single inbound message was rejected.
///
/// Rejected messages are logged and skipped; they never consume a
/// retry attempt.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command payload")]
    Empty,

    #[error("command payload is not valid JSON: {0}")]
    Unparseable(#[from] serde_json::Error),

    #[error("command payload has no \"Tc\" field")]
    MissingField,

    #[error("command value for \"Tc\" is not a finite number")]
    NotFinite,
}

/// Extract the control value from a raw inbound payload.
///
/// Producers occasionally double-encode the command object as a JSON
/// string; a single level of that is unwrapped. Accepts only an object
/// with a finite numeric `"Tc"` field.
pub fn decode_command(payload: &[u8]) -> Result<f64, CommandError> {
    if payload.is_empty() {
        return Err(CommandError::Empty);
    }

    let mut value: Value = serde_json::from_slice(payload)?;
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner)?;
    }

    let tc = value
        .get("Tc")
        .ok_or(CommandError::MissingField)?
        .as_f64()
        .ok_or(CommandError::NotFinite)?;

    if !tc.is_finite() {
        return Err(CommandError::NotFinite);
    }
    Ok(tc)
}

/// Bounds on how long [`CommandReceiver::receive`] may block.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Outer attempt ceiling.
    pub max_attempts: u32,
    /// An attempt's inner poll ends after this long with no traffic.
    pub idle_timeout: Duration,
    /// Length of the single re-poll made after the inner poll goes idle.
    pub retry_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            idle_timeout: Duration::from_secs(10),
            retry_timeout: Duration::from_secs(5),
        }
    }
}

/// Receives control commands from the inbound channel.
pub struct CommandReceiver<C: CommandSource> {
    source: C,
    policy: RetryPolicy,
}

impl<C: CommandSource> CommandReceiver<C> {
    pub fn new(source: C, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Block until a valid control value arrives or the retry policy is
    /// exhausted.
    ///
    /// Two nested loops: the outer one counts attempts, the inner one
    /// polls the channel until it has been idle for the policy's bound.
    /// Any message arriving — valid or not — resets the idle clock;
    /// invalid messages are logged and skipped without consuming an
    /// attempt. When an attempt goes idle, one shorter re-poll runs
    /// before the next attempt starts.
    ///
    /// # Errors
    ///
    /// Only transport failures surface as errors; "no valid command"
    /// is the [`CommandOutcome::Exhausted`] value.
    pub fn receive(&mut self) -> Result<CommandOutcome, ChannelError> {
        info!("waiting for a coolant temperature command");

        for attempt in 1..=self.policy.max_attempts {
            if let Some(tc) = self.poll_until_idle()? {
                return Ok(CommandOutcome::Accepted(tc));
            }

            info!(
                "attempt {attempt}/{} found no valid command, re-polling",
                self.policy.max_attempts
            );
            if let Some(tc) = self.poll_once(self.policy.retry_timeout)? {
                return Ok(CommandOutcome::Accepted(tc));
            }
        }

        info!(
            "no valid command after {} attempts, giving up",
            self.policy.max_attempts
        );
        Ok(CommandOutcome::Exhausted)
    }

    /// Inner poll loop: consume messages until the channel has been
    /// idle for `idle_timeout`, returning the first valid value.
    fn poll_until_idle(&mut self) -> Result<Option<f64>, ChannelError> {
        let mut deadline = Instant::now() + self.policy.idle_timeout;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            match self.source.poll(deadline - now)? {
                None => return Ok(None),
                Some(payload) => {
                    // Traffic of any kind restarts the idle clock.
                    deadline = Instant::now() + self.policy.idle_timeout;
                    if let Some(tc) = self.validate(&payload) {
                        return Ok(Some(tc));
                    }
                }
            }
        }
    }

    /// One poll of the channel, validating whatever arrives.
    fn poll_once(&mut self, timeout: Duration) -> Result<Option<f64>, ChannelError> {
        match self.source.poll(timeout)? {
            Some(payload) => Ok(self.validate(&payload)),
            None => Ok(None),
        }
    }

    fn validate(&self, payload: &[u8]) -> Option<f64> {
        debug!("raw command payload: {}", String::from_utf8_lossy(payload));
        match decode_command(payload) {
            Ok(tc) => {
                info!("received control command: Tc = {tc}");
                Some(tc)
            }
            Err(err) => {
                warn!("skipping command message: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted command source: pops one pre-programmed response per
    /// poll and counts the polls. An exhausted script keeps reporting
    /// idle timeouts.
    struct ScriptedSource {
        script: VecDeque<Result<Option<Vec<u8>>, ChannelError>>,
        polls: u32,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Option<Vec<u8>>, ChannelError>>) -> Self {
            Self {
                script: script.into(),
                polls: 0,
            }
        }

        fn idle() -> Self {
            Self::new(Vec::new())
        }
    }

    impl CommandSource for ScriptedSource {
        fn poll(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
            self.polls += 1;
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            idle_timeout: Duration::from_millis(50),
            retry_timeout: Duration::from_millis(20),
        }
    }

    #[test]
    fn decodes_a_valid_command() {
        let tc = decode_command(br#"{"Tc": 305.0}"#).unwrap();
        assert_eq!(tc, 305.0);
    }

    #[test]
    fn decodes_a_double_encoded_command() {
        let payload = serde_json::to_vec(&r#"{"Tc": 301.5}"#).unwrap();
        let tc = decode_command(&payload).unwrap();
        assert_eq!(tc, 301.5);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(decode_command(b""), Err(CommandError::Empty)));
        assert!(matches!(
            decode_command(b"not json at all"),
            Err(CommandError::Unparseable(_))
        ));
        assert!(matches!(
            decode_command(br#"{"setpoint": 1.0}"#),
            Err(CommandError::MissingField)
        ));
        assert!(matches!(
            decode_command(b"null"),
            Err(CommandError::MissingField)
        ));
        assert!(matches!(
            decode_command(br#"{"Tc": "warm"}"#),
            Err(CommandError::NotFinite)
        ));
        assert!(matches!(
            decode_command(br#"{"Tc": null}"#),
            Err(CommandError::NotFinite)
        ));
    }

    #[test]
    fn nan_command_is_treated_as_malformed() {
        // JSON has no NaN literal, so a NaN control value arrives as a
        // payload that fails to parse — same handling either way.
        assert!(matches!(
            decode_command(br#"{"Tc": NaN}"#),
            Err(CommandError::Unparseable(_))
        ));
    }

    #[test]
    fn telemetry_value_round_trips_through_the_validator() {
        let temp = 324.475_443_431_599;
        let payload = serde_json::to_vec(&serde_json::json!({ "Tc": temp })).unwrap();

        let decoded = decode_command(&payload).unwrap();
        assert!((decoded - temp).abs() < 1e-12);
    }

    #[test]
    fn exhausts_after_exactly_five_attempts() {
        let mut receiver = CommandReceiver::new(ScriptedSource::idle(), quick_policy());

        let outcome = receiver.receive().unwrap();

        assert_eq!(outcome, CommandOutcome::Exhausted);
        // Each attempt is one idle poll plus one re-poll.
        assert_eq!(receiver.source.polls, 10);
    }

    #[test]
    fn accepts_the_first_valid_message_immediately() {
        let source = ScriptedSource::new(vec![
            Ok(Some(b"garbage".to_vec())),
            Ok(Some(br#"{"Tc": null}"#.to_vec())),
            Ok(Some(br#"{"Tc": 305.0}"#.to_vec())),
        ]);
        let mut receiver = CommandReceiver::new(source, quick_policy());

        let outcome = receiver.receive().unwrap();

        assert_eq!(outcome, CommandOutcome::Accepted(305.0));
        // Invalid messages were skipped within the first attempt.
        assert_eq!(receiver.source.polls, 3);
    }

    #[test]
    fn re_poll_can_still_accept() {
        // First attempt's inner poll goes idle; the value arrives on
        // the shorter re-poll.
        let source = ScriptedSource::new(vec![
            Ok(None),
            Ok(Some(br#"{"Tc": 296.25}"#.to_vec())),
        ]);
        let mut receiver = CommandReceiver::new(source, quick_policy());

        let outcome = receiver.receive().unwrap();

        assert_eq!(outcome, CommandOutcome::Accepted(296.25));
        assert_eq!(receiver.source.polls, 2);
    }

    #[test]
    fn transport_failure_propagates() {
        let source = ScriptedSource::new(vec![Err(ChannelError::new("broker gone"))]);
        let mut receiver = CommandReceiver::new(source, quick_policy());

        assert!(receiver.receive().is_err());
    }
}
