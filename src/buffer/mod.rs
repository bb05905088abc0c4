pub mod batch;

pub use batch::Batch;

use bytes::{Bytes, BytesMut};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// What to evict when appending would push the buffer past its byte ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard the oldest buffered records until the new one fits. Under
    /// sustained backpressure the freshest logs are the most valuable.
    #[default]
    DropOldest,
    /// Discard the incoming record and keep what is already buffered.
    DropNewest,
}

/// Ordered queue of pre-serialized records awaiting transmission, bounded by
/// a byte ceiling that matches the actual wire size of its contents.
///
/// Exclusively owned by the forwarding loop; appends go to the back, batches
/// are taken from the front, so a pending [`Batch`] stays valid until
/// [`commit`](Self::commit).
#[derive(Debug)]
pub struct ForwardBuffer {
    records: VecDeque<Bytes>,
    bytes: usize,
    limit: usize,
    policy: OverflowPolicy,
    dropped: u64,
}

impl ForwardBuffer {
    pub fn new(limit: usize, policy: OverflowPolicy) -> Self {
        Self {
            records: VecDeque::new(),
            bytes: 0,
            limit,
            policy,
            dropped: 0,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total byte size of all buffered records. Never exceeds the ceiling.
    pub fn pending_bytes(&self) -> usize {
        self.bytes
    }

    /// Records discarded by the overflow policy since startup. Monotone.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Queues a serialized record, evicting per the overflow policy if the
    /// ceiling would be exceeded.
    pub fn append(&mut self, record: Bytes) {
        let len = record.len();
        if len > self.limit {
            self.dropped += 1;
            warn!(
                record_bytes = len,
                limit = self.limit,
                total_dropped = self.dropped,
                "record larger than buffer ceiling, discarded"
            );
            return;
        }

        if self.bytes + len > self.limit {
            match self.policy {
                OverflowPolicy::DropOldest => {
                    let mut evicted = 0u64;
                    while self.bytes + len > self.limit {
                        let Some(old) = self.records.pop_front() else {
                            break;
                        };
                        self.bytes -= old.len();
                        evicted += 1;
                    }
                    self.dropped += evicted;
                    warn!(
                        evicted,
                        total_dropped = self.dropped,
                        "buffer ceiling exceeded, dropped oldest records"
                    );
                }
                OverflowPolicy::DropNewest => {
                    self.dropped += 1;
                    warn!(
                        total_dropped = self.dropped,
                        "buffer ceiling exceeded, dropped incoming record"
                    );
                    return;
                }
            }
        }

        self.bytes += len;
        self.records.push_back(record);
    }

    /// Builds a batch from the front of the queue, up to `max_bytes` of
    /// payload (always at least one record). The records remain buffered
    /// until [`commit`](Self::commit) confirms the write.
    pub fn front_batch(&self, max_bytes: usize) -> Option<Batch> {
        let mut payload = BytesMut::new();
        let mut records = 0;
        for record in &self.records {
            if records > 0 && payload.len() + record.len() > max_bytes {
                break;
            }
            payload.extend_from_slice(record);
            records += 1;
        }
        if records == 0 {
            return None;
        }
        Some(Batch::new(payload.freeze(), records))
    }

    /// Removes a confirmed-sent batch from the front of the queue. Must be
    /// the batch most recently returned by [`front_batch`](Self::front_batch);
    /// appends in between are fine, evictions are not possible in between
    /// because the loop owns the buffer.
    pub fn commit(&mut self, batch: &Batch) {
        for _ in 0..batch.records() {
            if let Some(record) = self.records.pop_front() {
                self.bytes -= record.len();
            }
        }
    }
}
