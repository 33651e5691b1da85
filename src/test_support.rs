//! [`TestHost`]: an in-process [`crate::Host`] for exercising
//! [`crate::FileTransmission`] without a real terminal emulator or event
//! loop, mirroring the Python original's `TestFileTransmission` harness.
//!
//! Unlike that harness, `TestHost` does not auto-answer confirmation
//! prompts or self-drive timers: this crate's [`crate::Host`] is a
//! separate object from [`crate::FileTransmission`] rather than a base
//! class of it, so a test calls [`crate::FileTransmission::on_confirmation`]
//! / [`crate::FileTransmission::on_timer`] itself once it has inspected
//! what `TestHost` recorded.

use std::collections::VecDeque;
use std::time::Duration;

use crate::host::{Confirmation, Side, Timer, TimerHandle, TimerToken, Writer};

/// One scheduled-but-not-yet-fired timer callback.
#[derive(Clone, Debug)]
pub struct ScheduledTimer {
    /// How long after scheduling this was meant to fire.
    pub after: Duration,
    /// Which pump this callback belongs to.
    pub token: TimerToken,
}

/// A minimal, in-process [`crate::Host`]: every frame written is captured
/// instead of sent anywhere, every confirmation prompt is recorded for the
/// test to inspect and answer, and every scheduled timer is recorded
/// rather than waited on.
#[derive(Default)]
pub struct TestHost {
    /// Every frame [`Writer::write_serialized`] accepted, in order.
    pub written: Vec<Vec<u8>>,
    /// Whether the next `write_serialized` call should report backpressure
    /// (return `false`) instead of accepting the frame.
    pub refuse_writes: bool,
    /// Every confirmation prompt raised, in order, as `(message, id, side)`.
    pub prompts: Vec<(String, String, Side)>,
    /// Timers scheduled but not yet fired, oldest first.
    pub pending_timers: VecDeque<ScheduledTimer>,
    next_handle: u64,
}

impl TestHost {
    /// Builds a host with nothing recorded yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every frame captured in [`Self::written`] as a command body
    /// (stripping the OSC prefix and any trailing terminator a real
    /// terminal emulator would require the host to add), for assertions
    /// against [`protocol::FileTransferCommand`].
    #[must_use]
    pub fn written_as_utf8(&self) -> Vec<String> {
        self.written
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect()
    }

    /// Pops the oldest recorded confirmation prompt, if any.
    pub fn take_prompt(&mut self) -> Option<(String, String, Side)> {
        if self.prompts.is_empty() {
            None
        } else {
            Some(self.prompts.remove(0))
        }
    }

    /// Pops the oldest scheduled timer whose token matches `token`, if any,
    /// so a test can fire exactly the pump it means to advance without
    /// disturbing unrelated scheduled callbacks.
    pub fn take_timer(&mut self, token: &TimerToken) -> Option<ScheduledTimer> {
        let index = self.pending_timers.iter().position(|t| &t.token == token)?;
        self.pending_timers.remove(index)
    }
}

impl Writer for TestHost {
    fn write_serialized(&mut self, frame: &[u8]) -> bool {
        if self.refuse_writes {
            return false;
        }
        self.written.push(frame.to_vec());
        true
    }
}

impl Confirmation for TestHost {
    fn prompt_yesno(&mut self, message: &str, id: &str, side: Side) {
        self.prompts.push((message.to_string(), id.to_string(), side));
    }
}

impl Timer for TestHost {
    fn schedule(&mut self, after: Duration, token: TimerToken) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.pending_timers.push_back(ScheduledTimer { after, token });
        handle
    }
}
