//! Scripted channel implementations for closed-loop tests
//!
//! These stand in for the broker: the sink records every payload it is
//! given, and the source plays back a pre-programmed sequence of poll
//! responses, reporting idle once the script runs out.

use std::collections::VecDeque;
use std::time::Duration;

use cstr_simulator::channel::{ChannelError, CommandSource, TelemetrySink};

/// Records every published payload.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Vec<Vec<u8>>,
}

impl TelemetrySink for RecordingSink {
    fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        self.sent.push(payload.to_vec());
        Ok(())
    }
}

/// Plays back scripted poll responses; `None` entries are idle
/// timeouts, and an exhausted script stays idle forever.
pub struct ScriptedSource {
    script: VecDeque<Option<Vec<u8>>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Option<Vec<u8>>>) -> Self {
        Self {
            script: script.into(),
        }
    }

    /// A source that never produces a message.
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }
}

impl CommandSource for ScriptedSource {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        Ok(self.script.pop_front().flatten())
    }
}
