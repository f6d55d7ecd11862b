//! Structured progress reported by the external converter.
//!
//! The converter reports a phase label plus optional counters and the
//! item it is currently working on. Consumers render it with
//! [`ConversionProgress::display_message`] instead of parsing strings.

use serde::{Deserialize, Serialize};

/// One progress observation for an in-flight conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionProgress {
    /// Phase label, e.g. `"Crawling documentation pages..."`.
    pub phase: String,
    /// Item currently being processed (usually a page URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    /// Items finished so far in this phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u32>,
    /// Expected total for this phase, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
}

impl ConversionProgress {
    /// Create a progress value carrying only a phase label.
    pub fn phase(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            current_item: None,
            completed: None,
            total: None,
        }
    }

    pub fn with_current_item(mut self, item: impl Into<String>) -> Self {
        self.current_item = Some(item.into());
        self
    }

    pub fn with_counts(mut self, completed: Option<u32>, total: Option<u32>) -> Self {
        self.completed = completed;
        self.total = total;
        self
    }

    /// Render a single-line message, e.g.
    /// `"Crawling documentation pages... (3/10) - https://example.com/docs/a"`.
    pub fn display_message(&self) -> String {
        let mut message = self.phase.clone();
        match (self.completed, self.total) {
            (Some(done), Some(total)) => message.push_str(&format!(" ({done}/{total})")),
            (Some(done), None) => message.push_str(&format!(" ({done})")),
            _ => {}
        }
        if let Some(item) = &self.current_item {
            message.push_str(" - ");
            message.push_str(item);
        }
        message
    }
}
