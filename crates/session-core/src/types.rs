use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SessionError;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Coarse workflow stage of a session.
///
/// Legacy manifests used `spec/plan/build/docs`; those names are accepted on
/// read and always written back in the current form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[serde(alias = "spec")]
    Intent,
    #[serde(alias = "plan")]
    Design,
    #[serde(alias = "build")]
    Execute,
    #[serde(alias = "docs")]
    Document,
    Complete,
}

impl Phase {
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Intent,
            Phase::Design,
            Phase::Execute,
            Phase::Document,
            Phase::Complete,
        ]
    }

    /// Allowed successors. `document` may be skipped from `execute`.
    pub fn successors(self) -> &'static [Phase] {
        match self {
            Phase::Intent => &[Phase::Design],
            Phase::Design => &[Phase::Execute],
            Phase::Execute => &[Phase::Document, Phase::Complete],
            Phase::Document => &[Phase::Complete],
            Phase::Complete => &[],
        }
    }

    pub fn can_transition_to(self, target: Phase) -> bool {
        self.successors().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Intent => "intent",
            Phase::Design => "design",
            Phase::Execute => "execute",
            Phase::Document => "document",
            Phase::Complete => "complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intent" | "spec" => Ok(Phase::Intent),
            "design" | "plan" => Ok(Phase::Design),
            "execute" | "build" => Ok(Phase::Execute),
            "document" | "docs" => Ok(Phase::Document),
            "complete" => Ok(Phase::Complete),
            _ => Err(SessionError::InvalidPhase(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Advisory execution status, separate from the phase state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Paused,
    Complete,
    Failed,
}

impl Status {
    pub fn all() -> &'static [Status] {
        &[Status::Active, Status::Paused, Status::Complete, Status::Failed]
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Complete | Status::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Paused => "paused",
            Status::Complete => "complete",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Status::Active),
            "paused" => Ok(Status::Paused),
            "complete" => Ok(Status::Complete),
            "failed" => Ok(Status::Failed),
            _ => Err(SessionError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    #[default]
    Full,
    Quick,
    Research,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Full => "full",
            SessionType::Quick => "quick",
            SessionType::Research => "research",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SessionType::Full),
            "quick" => Ok(SessionType::Quick),
            "research" => Ok(SessionType::Research),
            _ => Err(SessionError::validation(
                "session_type",
                format!("unknown session type '{s}'"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Status of a plan checkpoint or task. Set by the executing worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Complete => "complete",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" | "in-progress" => Ok(TaskStatus::InProgress),
            "complete" | "completed" => Ok(TaskStatus::Complete),
            "blocked" => Ok(TaskStatus::Blocked),
            _ => Err(SessionError::validation(
                "status",
                format!("unknown task status '{s}'"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// PlanStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Draft,
    InProgress,
    Complete,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::Draft => "draft",
            PlanStatus::InProgress => "in_progress",
            PlanStatus::Complete => "complete",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// NoteCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteCategory {
    /// A failing verification gate was bypassed with a justification.
    Override,
    Decision,
    Deviation,
    Blocker,
    Discovery,
}

impl NoteCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            NoteCategory::Override => "override",
            NoteCategory::Decision => "decision",
            NoteCategory::Deviation => "deviation",
            NoteCategory::Blocker => "blocker",
            NoteCategory::Discovery => "discovery",
        }
    }
}

impl fmt::Display for NoteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NoteCategory {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "override" => Ok(NoteCategory::Override),
            "decision" => Ok(NoteCategory::Decision),
            "deviation" => Ok(NoteCategory::Deviation),
            "blocker" => Ok(NoteCategory::Blocker),
            "discovery" => Ok(NoteCategory::Discovery),
            _ => Err(SessionError::validation(
                "category",
                format!("unknown note category '{s}'"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn transition_table() {
        assert!(Phase::Intent.can_transition_to(Phase::Design));
        assert!(Phase::Design.can_transition_to(Phase::Execute));
        assert!(Phase::Execute.can_transition_to(Phase::Document));
        assert!(Phase::Execute.can_transition_to(Phase::Complete));
        assert!(Phase::Document.can_transition_to(Phase::Complete));

        assert!(!Phase::Intent.can_transition_to(Phase::Execute));
        assert!(!Phase::Design.can_transition_to(Phase::Intent));
        assert!(!Phase::Intent.can_transition_to(Phase::Intent));
        assert!(Phase::Complete.successors().is_empty());
    }

    #[test]
    fn phase_parses_legacy_names() {
        assert_eq!(Phase::from_str("spec").unwrap(), Phase::Intent);
        assert_eq!(Phase::from_str("build").unwrap(), Phase::Execute);
        assert!(Phase::from_str("shipping").is_err());

        let p: Phase = serde_json::from_str("\"docs\"").unwrap();
        assert_eq!(p, Phase::Document);
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"document\"");
    }

    #[test]
    fn terminal_statuses() {
        assert!(Status::Complete.is_terminal());
        assert!(Status::Failed.is_terminal());
        assert!(!Status::Paused.is_terminal());
        assert!(Status::from_str("bogus").is_err());
    }

    #[test]
    fn unknown_status_rejected_at_boundary() {
        let res: std::result::Result<Status, _> = serde_json::from_str("\"running\"");
        assert!(res.is_err());
    }

    #[test]
    fn task_status_accepts_completed_alias() {
        assert_eq!(TaskStatus::from_str("completed").unwrap(), TaskStatus::Complete);
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
    }
}
