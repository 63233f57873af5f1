use crate::config::VerificationPolicy;
use crate::error::{Result, SessionError};
use crate::plan::ExecutionPlan;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// VerificationResult / VerificationOverride
// ---------------------------------------------------------------------------

/// Outcome of one verification step, as run and reported by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub step: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl VerificationResult {
    pub fn passed(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            passed: true,
            output: None,
        }
    }

    pub fn failed(step: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            passed: false,
            output: Some(output.into()),
        }
    }
}

/// Explicit bypass of a failing gate. Never applied implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOverride {
    pub justification: String,
}

impl VerificationOverride {
    pub fn new(justification: impl Into<String>) -> Result<Self> {
        let justification = justification.into().trim().to_string();
        if justification.is_empty() {
            return Err(SessionError::validation(
                "override.justification",
                "must not be empty",
            ));
        }
        Ok(Self { justification })
    }
}

// ---------------------------------------------------------------------------
// GateOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub checkpoint: u32,
    pub passed: bool,
    /// Steps that reported failure.
    pub failed_steps: Vec<String>,
    /// Declared steps with no reported result.
    pub missing_steps: Vec<String>,
    pub incomplete_tasks: Vec<String>,
}

impl GateOutcome {
    /// Failing and missing steps together, in declaration/report order.
    pub fn unsatisfied_steps(&self) -> Vec<String> {
        self.failed_steps
            .iter()
            .cloned()
            .chain(self.missing_steps.iter().map(|s| format!("{s} (no result)")))
            .collect()
    }

    pub fn to_error(&self) -> SessionError {
        SessionError::VerificationFailed {
            checkpoint: self.checkpoint,
            failed_steps: self.unsatisfied_steps(),
            incomplete_tasks: self.incomplete_tasks.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// evaluate
// ---------------------------------------------------------------------------

/// Decide whether `checkpoint` may be marked complete.
///
/// With a plan, every declared verification step must have a passing result
/// and (by default) every task must be complete. Without a plan, only the
/// supplied results are checked unless the policy requires a plan.
pub fn evaluate(
    checkpoint: u32,
    plan: Option<&ExecutionPlan>,
    results: &[VerificationResult],
    policy: &VerificationPolicy,
    session_id: &str,
) -> Result<GateOutcome> {
    if let Some(bad) = results.iter().find(|r| r.step.trim().is_empty()) {
        return Err(SessionError::validation(
            "verification.step",
            format!("result with empty step name (passed={})", bad.passed),
        ));
    }

    let failed_steps: Vec<String> = results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| r.step.clone())
        .collect();

    let (missing_steps, incomplete_tasks) = match plan {
        Some(plan) => {
            let cp = plan.checkpoint(checkpoint)?;
            let missing = cp
                .testing_strategy
                .verification_steps
                .iter()
                .filter(|step| !results.iter().any(|r| &r.step == *step))
                .cloned()
                .collect();
            let incomplete = if policy.require_tasks_complete {
                plan.checkpoint_readiness(checkpoint)?.incomplete_tasks
            } else {
                Vec::new()
            };
            (missing, incomplete)
        }
        None if policy.require_plan => {
            return Err(SessionError::PlanNotFound(session_id.to_string()));
        }
        None => (Vec::new(), Vec::new()),
    };

    let passed = failed_steps.is_empty() && missing_steps.is_empty() && incomplete_tasks.is_empty();
    Ok(GateOutcome {
        checkpoint,
        passed,
        failed_steps,
        missing_steps,
        incomplete_tasks,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
