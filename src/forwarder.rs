use crate::buffer::{ForwardBuffer, OverflowPolicy};
use crate::event::Event;
use crate::input::LineFramer;
use crate::sender::{
    Connection, DrainReporter, PickStrategy, PoolSelector, SenderStats, SenderStatsSnapshot,
    ServerPool, UniformPick, WireFormat, encode,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ForwarderError {
    #[error("input stream closed before a terminate signal")]
    InputClosed,
}

/// External liveness signals, polled cooperatively at loop granularity.
/// Supplied by the caller so the engine never owns global mutable state.
pub trait Liveness: Send + Sync {
    /// Checked every iteration; never consumes.
    fn should_terminate(&self) -> bool;

    /// With `consume = true`, reading the flag also clears it.
    fn should_reconnect(&self, consume: bool) -> bool;
}

/// Engine tunables, resolved by the bootstrap layer.
#[derive(Debug, Clone)]
pub struct ForwarderSettings {
    pub tag: String,
    pub field_name: String,
    pub format: WireFormat,
    pub buffer_limit_bytes: usize,
    pub overflow_policy: OverflowPolicy,
    pub max_batch_bytes: usize,
    pub drain_tag: Option<String>,
    pub drain_interval: u64,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub failover_backoff: Duration,
    pub idle_wait: Duration,
}

impl Default for ForwarderSettings {
    fn default() -> Self {
        Self {
            tag: "tail".to_string(),
            field_name: "message".to_string(),
            format: WireFormat::default(),
            buffer_limit_bytes: 8 * 1024 * 1024,
            overflow_policy: OverflowPolicy::default(),
            max_batch_bytes: 2 * 1024 * 1024,
            drain_tag: None,
            drain_interval: 300,
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(30),
            failover_backoff: Duration::from_secs(2),
            idle_wait: Duration::from_millis(100),
        }
    }
}

/// Totals reported when the loop exits.
#[derive(Debug, Clone)]
pub struct ForwardSummary {
    pub sender: SenderStatsSnapshot,
    pub dropped_records: u64,
    pub unsent_records: usize,
}

/// The forwarding engine: owns the buffer, selector, connection and drain
/// reporter exclusively, pulls framed lines off the input channel, and
/// drives flushes until terminated.
pub struct Forwarder {
    settings: ForwarderSettings,
    framer: LineFramer,
    buffer: ForwardBuffer,
    selector: PoolSelector,
    connection: Connection,
    drain: DrainReporter,
    input: mpsc::Receiver<String>,
    liveness: Arc<dyn Liveness>,
    stats: Arc<SenderStats>,
}

impl Forwarder {
    pub fn new(
        settings: ForwarderSettings,
        pool: ServerPool,
        input: mpsc::Receiver<String>,
        liveness: Arc<dyn Liveness>,
    ) -> Self {
        Self::with_strategy(settings, pool, input, liveness, Box::new(UniformPick))
    }

    /// Constructor with an injected pick strategy, for deterministic tests.
    pub fn with_strategy(
        settings: ForwarderSettings,
        pool: ServerPool,
        input: mpsc::Receiver<String>,
        liveness: Arc<dyn Liveness>,
        strategy: Box<dyn PickStrategy>,
    ) -> Self {
        let framer = LineFramer::new(settings.tag.clone(), settings.field_name.clone());
        let buffer = ForwardBuffer::new(settings.buffer_limit_bytes, settings.overflow_policy);
        let selector = PoolSelector::with_strategy(pool, settings.failover_backoff, strategy);
        let connection = Connection::new(settings.connect_timeout, settings.write_timeout);
        let drain = DrainReporter::new(settings.drain_tag.clone(), settings.drain_interval);
        Self {
            settings,
            framer,
            buffer,
            selector,
            connection,
            drain,
            input,
            liveness,
            stats: Arc::new(SenderStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<SenderStats> {
        Arc::clone(&self.stats)
    }

    /// Runs until the terminate signal (Ok) or input closure (Err). Network
    /// failures are never fatal; they cycle through failover indefinitely.
    pub async fn run(mut self) -> Result<ForwardSummary, ForwarderError> {
        info!(tag = %self.framer.tag(), format = ?self.settings.format, "forwarding loop started");
        let mut input_open = true;
        loop {
            let mut progress = false;

            // 1. Drain whatever input is immediately available.
            while input_open {
                match self.input.try_recv() {
                    Ok(line) => {
                        progress = true;
                        self.ingest_line(&line);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => input_open = false,
                }
            }

            // 2. One flush attempt against the selected endpoint.
            if self.buffer.has_pending() && self.flush_once().await {
                progress = true;
            }

            // 3. Terminate: one final best-effort flush, then out.
            if self.liveness.should_terminate() {
                info!("terminate signal observed, attempting final flush");
                self.final_flush().await;
                return Ok(self.finish());
            }
            if !input_open {
                error!("input stream closed, attempting final flush before exit");
                self.final_flush().await;
                self.finish();
                return Err(ForwarderError::InputClosed);
            }

            // 4. Forced reconnect: drop the connection, re-probe primary.
            if self.liveness.should_reconnect(true) {
                info!("reconnect signal observed, resetting to primary pool");
                self.connection.close();
                self.selector.reset();
            }

            // 5. Drain telemetry rides the normal buffer path.
            self.drain.tick();
            if let Some(event) = self.drain.maybe_emit() {
                self.ingest_event(&event);
            }

            // 6. Idle: nothing read, nothing flushed.
            if !progress {
                tokio::time::sleep(self.settings.idle_wait).await;
            }
        }
    }

    fn ingest_line(&mut self, line: &str) {
        let Some(event) = self.framer.frame(line) else {
            return;
        };
        self.ingest_event(&event);
    }

    fn ingest_event(&mut self, event: &Event) {
        match encode(event, self.settings.format) {
            Ok(record) => self.buffer.append(record),
            // Encoding our own events cannot realistically fail; if it ever
            // does, the line is lost but the loop keeps running.
            Err(e) => error!(tag = %event.tag(), error = %e, "event serialization failed"),
        }
    }

    /// One flush attempt: select, connect if needed, send the front batch.
    /// Returns true when a batch was confirmed and committed. On any error
    /// the endpoint is marked failed and the batch stays buffered.
    async fn flush_once(&mut self) -> bool {
        let Some(endpoint) = self.selector.select() else {
            // All pools exhausted; selector is in its backoff window.
            return false;
        };

        if !self.connection.is_connected_to(&endpoint) {
            self.connection.close();
            match self.connection.connect(&endpoint).await {
                Ok(()) => {
                    self.stats.record_connect();
                    info!(%endpoint, "connected to collection server");
                }
                Err(e) => {
                    warn!(%endpoint, error = %e, "connect failed, marking endpoint failed");
                    self.stats.record_connect_failure();
                    self.selector.mark_failed(&endpoint);
                    return false;
                }
            }
        }

        let Some(batch) = self.buffer.front_batch(self.settings.max_batch_bytes) else {
            return false;
        };
        match self.connection.send(&batch).await {
            Ok(()) => {
                self.buffer.commit(&batch);
                self.selector.mark_success();
                let records = batch.records() as u64;
                let bytes = batch.wire_len() as u64;
                self.stats.record_batch(records, bytes);
                self.drain.record(records, bytes);
                debug!(batch = %batch.id(), records, bytes, "batch forwarded");
                true
            }
            Err(e) => {
                warn!(
                    %endpoint,
                    batch = %batch.id(),
                    records = batch.records(),
                    error = %e,
                    "send failed, batch retained for retry"
                );
                self.stats.record_send_failure();
                self.connection.close();
                self.selector.mark_failed(&endpoint);
                false
            }
        }
    }

    /// One best-effort shutdown episode: keep flushing until the buffer is
    /// empty or the first failure. No indefinite retry at shutdown.
    async fn final_flush(&mut self) {
        while self.buffer.has_pending() {
            if !self.flush_once().await {
                warn!(
                    unsent_records = self.buffer.len(),
                    unsent_bytes = self.buffer.pending_bytes(),
                    "final flush incomplete"
                );
                break;
            }
        }
        self.connection.close();
    }

    fn finish(&mut self) -> ForwardSummary {
        let summary = ForwardSummary {
            sender: self.stats.snapshot(),
            dropped_records: self.buffer.dropped(),
            unsent_records: self.buffer.len(),
        };
        info!(
            records = summary.sender.records_sent,
            bytes = summary.sender.bytes_sent,
            dropped = summary.dropped_records,
            unsent = summary.unsent_records,
            "forwarding loop stopped"
        );
        summary
    }
}
