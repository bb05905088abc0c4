use crate::event::Event;

/// Turns raw input lines into [`Event`]s carrying the configured tag, with
/// the line stored under the configured record field.
#[derive(Debug, Clone)]
pub struct LineFramer {
    tag: String,
    field_name: String,
}

impl LineFramer {
    pub fn new(tag: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            field_name: field_name.into(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// One event per non-empty line. Empty lines produce nothing.
    pub fn frame(&self, line: &str) -> Option<Event> {
        if line.is_empty() {
            return None;
        }
        Some(Event::now(
            self.tag.clone(),
            vec![(self.field_name.clone(), line.to_string())],
        ))
    }
}
