use crate::event::Event;

/// Optional throughput telemetry: accumulates forwarded message/byte counts
/// and periodically turns them into a synthetic event under the drain tag,
/// sent down the same wire as regular events.
///
/// The cadence is counted in flush cycles, not wall-clock time; the
/// forwarding loop ticks it once per iteration. Without a drain tag this is
/// a no-op.
#[derive(Debug)]
pub struct DrainReporter {
    tag: Option<String>,
    interval: u64,
    cycles: u64,
    messages: u64,
    bytes: u64,
}

impl DrainReporter {
    pub fn new(tag: Option<String>, interval: u64) -> Self {
        Self {
            tag,
            interval: interval.max(1),
            cycles: 0,
            messages: 0,
            bytes: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, 1)
    }

    pub fn is_enabled(&self) -> bool {
        self.tag.is_some()
    }

    /// Feeds counts from one confirmed batch.
    pub fn record(&mut self, messages: u64, bytes: u64) {
        if self.is_enabled() {
            self.messages += messages;
            self.bytes += bytes;
        }
    }

    /// Advances one flush cycle.
    pub fn tick(&mut self) {
        if self.is_enabled() {
            self.cycles += 1;
        }
    }

    /// Emits the drain event when the interval has elapsed, resetting the
    /// accumulated stats. Zero counts are still reported; a silent period is
    /// a signal too.
    pub fn maybe_emit(&mut self) -> Option<Event> {
        let tag = self.tag.as_ref()?;
        if self.cycles < self.interval {
            return None;
        }
        let event = Event::now(
            tag.clone(),
            vec![
                ("messages".to_string(), self.messages.to_string()),
                ("bytes".to_string(), self.bytes.to_string()),
            ],
        );
        self.cycles = 0;
        self.messages = 0;
        self.bytes = 0;
        Some(event)
    }

    /// Accumulated counts since the last emission (for shutdown logging).
    pub fn pending(&self) -> (u64, u64) {
        (self.messages, self.bytes)
    }
}
