//! Wire and data-model types shared between the orchestrator binary, its
//! collaborator clients, and (conceptually) external callers.
//!
//! Everything here is plain serde DTOs; no behavior beyond constructors that
//! keep the orchestration pipeline's invariants impossible to violate by
//! construction (see `PipelineResponse`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single inbound orchestration request.
///
/// `id` is assigned by the caller or generated at entry; it is unique within
/// a process lifetime for tracing and is echoed back in `PipelineResponse`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Request {
    pub id: String,
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}

/// One result from a semantic similarity search over stored interactions.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MemoryHit {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Closed safety classification for a single action. Defaults to `Medium`
/// when omitted from model output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for SafetyLevel {
    fn default() -> Self {
        SafetyLevel::Medium
    }
}

impl SafetyLevel {
    /// Parse from the raw string a model or a permissive JSON blob may supply.
    /// Returns `None` for anything outside the closed four-value set, which
    /// the plan parser (C2) turns into a `shape_invalid` error plan.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "low" => Some(SafetyLevel::Low),
            "medium" => Some(SafetyLevel::Medium),
            "high" => Some(SafetyLevel::High),
            "critical" => Some(SafetyLevel::Critical),
            _ => None,
        }
    }
}

/// A single tool invocation with typed arguments and a safety level.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub safety_level: SafetyLevel,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub critical: Option<bool>,
}

impl Action {
    /// Open Question (a), decided: `critical` is the OR of an explicit
    /// per-action flag and `safety_level == Critical`, so neither an LLM
    /// that sets the flag without the level, nor one that picks the level
    /// without the flag, is silently downgraded.
    pub fn is_critical(&self) -> bool {
        self.critical.unwrap_or(false) || self.safety_level == SafetyLevel::Critical
    }
}

/// A validated, structured description of intent and actions produced from
/// LLM output by the plan parser (C2).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Plan {
    pub intent: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default)]
    pub estimated_duration_s: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl Plan {
    /// Construct the canonical error plan: `intent = "error"`, no actions,
    /// populated `error`. Threads a parser failure through the pipeline
    /// without ever raising.
    pub fn error_plan(reason: impl Into<String>) -> Self {
        Plan {
            intent: "error".to_string(),
            actions: Vec::new(),
            requires_confirmation: false,
            estimated_duration_s: 0,
            error: Some(reason.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.intent == "error" && self.error.is_some()
    }
}

/// The safety validator's (C3) sum-typed output.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ValidationVerdict {
    pub safe: bool,
    pub reason: String,
    #[serde(default)]
    pub requires_confirmation: Option<bool>,
}

impl ValidationVerdict {
    pub fn safe(reason: impl Into<String>) -> Self {
        ValidationVerdict {
            safe: true,
            reason: reason.into(),
            requires_confirmation: None,
        }
    }

    pub fn unsafe_(reason: impl Into<String>) -> Self {
        ValidationVerdict {
            safe: false,
            reason: reason.into(),
            requires_confirmation: None,
        }
    }
}

/// Outcome status of a single dispatched action.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
    Timeout,
}

/// Per-action result, produced by the action executor (C4).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ActionOutcome {
    pub action: String,
    pub status: OutcomeStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub execution_time_s: f64,
    /// RFC3339, captured at outcome creation.
    pub timestamp: String,
}

/// Final pipeline status. See Invariant I3.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Success,
    Partial,
    Rejected,
    Error,
}

/// The orchestration pipeline's single response type (C5's contract).
///
/// Constructors here are the only supported way to build one, so that
/// Invariants I1-I3 cannot be violated by a caller: a `rejected` response
/// can never carry `results`, an `error` response can never carry `plan`
/// unless it's the parser's error plan, etc.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PipelineResponse {
    pub request_id: String,
    pub status: PipelineStatus,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub results: Option<Vec<ActionOutcome>>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    pub timestamp: String,
}

impl PipelineResponse {
    fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    /// I2: a rejected response carries `reason` and no `results`.
    pub fn rejected(request_id: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineResponse {
            request_id: request_id.into(),
            status: PipelineStatus::Rejected,
            plan: None,
            results: None,
            summary: None,
            reason: Some(reason.into()),
            timestamp: Self::now(),
        }
    }

    /// I3: `error` status means the pipeline aborted before execution.
    pub fn error(request_id: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineResponse {
            request_id: request_id.into(),
            status: PipelineStatus::Error,
            plan: None,
            results: None,
            summary: None,
            reason: Some(reason.into()),
            timestamp: Self::now(),
        }
    }

    /// Builds the success/partial response from a plan and its outcomes,
    /// per §4.5 stage 7: success iff every outcome succeeded, else partial.
    pub fn completed(request_id: impl Into<String>, plan: Plan, results: Vec<ActionOutcome>) -> Self {
        let total = results.len();
        let succeeded = results
            .iter()
            .filter(|r| r.status == OutcomeStatus::Success)
            .count();
        let status = if total > 0 && succeeded == total {
            PipelineStatus::Success
        } else if succeeded == total {
            // total == 0: empty plan, trivially "all succeeded" (S1).
            PipelineStatus::Success
        } else {
            PipelineStatus::Partial
        };
        let summary = format!("Executed {}/{} actions successfully.", succeeded, total);
        PipelineResponse {
            request_id: request_id.into(),
            status,
            plan: Some(plan),
            results: Some(results),
            summary: Some(summary),
            reason: None,
            timestamp: Self::now(),
        }
    }
}

/// Semantic error taxonomy (§7). Not every variant appears on the wire;
/// this exists primarily so logging/metrics can classify failures
/// consistently across the collaborator clients and the pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorErrorCode {
    Configuration,
    UpstreamUnavailable,
    UpstreamMalformed,
    Parser,
    PolicyRejection,
    ActionTimeout,
    ActionError,
    DeadlineExceeded,
    Internal,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OrchestratorError {
    pub code: OrchestratorErrorCode,
    pub message: String,
    #[serde(default)]
    pub details: Option<Value>,
}
