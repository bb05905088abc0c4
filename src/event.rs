use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::time::{SystemTime, UNIX_EPOCH};

/// A single forwardable log event: `(tag, timestamp, record)`.
///
/// Field insertion order is preserved through serialization, which is why
/// the record is a `Vec` of pairs rather than a map type. Events are
/// immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    tag: String,
    timestamp: u64,
    fields: Vec<(String, String)>,
}

impl Event {
    pub fn new(tag: impl Into<String>, timestamp: u64, fields: Vec<(String, String)>) -> Self {
        Self {
            tag: tag.into(),
            timestamp,
            fields,
        }
    }

    /// Creates an event stamped with the current wall-clock second.
    pub fn now(tag: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self::new(tag, unix_now(), fields)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

/// Current wall-clock time as unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// Events go on the wire as the 3-element array `[tag, timestamp, record]`
// (Fluentd Forward "Message" shape), with the record as a map. The manual
// impl keeps the record's insertion order, which a derived HashMap field
// would not.
impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.tag)?;
        seq.serialize_element(&self.timestamp)?;
        seq.serialize_element(&OrderedRecord(&self.fields))?;
        seq.end()
    }
}

struct OrderedRecord<'a>(&'a [(String, String)]);

impl Serialize for OrderedRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
