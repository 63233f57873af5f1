use crate::error::{Result, SessionError};
use crate::types::NoteCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only audit entry recorded on the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevNote {
    pub id: Uuid,
    pub category: NoteCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<u32>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl DevNote {
    pub fn new(
        category: NoteCategory,
        content: impl Into<String>,
        checkpoint: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let content = content.into();
        let content = content.trim();
        if content.is_empty() {
            return Err(SessionError::validation("content", "must not be empty"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            category,
            checkpoint,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Audit entry for a bypassed verification gate.
    pub fn verification_override(
        checkpoint: u32,
        justification: &str,
        failed_steps: &[String],
        incomplete_tasks: &[String],
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let mut content = format!("Verification override for checkpoint {checkpoint}: {justification}");
        if !failed_steps.is_empty() {
            content.push_str(&format!("\nFailed steps: {}", failed_steps.join(", ")));
        }
        if !incomplete_tasks.is_empty() {
            content.push_str(&format!("\nIncomplete tasks: {}", incomplete_tasks.join(", ")));
        }
        Self::new(NoteCategory::Override, content, Some(checkpoint), now)
    }
}

/// Notes filtered by category, in recorded order.
pub fn by_category(notes: &[DevNote], category: NoteCategory) -> Vec<&DevNote> {
    notes.iter().filter(|n| n.category == category).collect()
}
