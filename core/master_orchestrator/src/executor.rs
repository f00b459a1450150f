//! C4: the action executor. Dispatches a validated `Plan`'s actions to the
//! action-exec collaborator sequentially, one at a time, per `spec.md`
//! §4.4 — there is no fan-out here, since actions may have ordering
//! dependencies the plan doesn't make explicit.

use std::time::{Duration, Instant};

use chrono::Utc;
use shared_types::{Action, ActionOutcome, OutcomeStatus, Plan};
use tracing::warn;

use crate::clients::ActionClient;

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Dispatches every action in `plan.actions` in order, wrapping each call in
/// `timeout`. Stops dispatching (the remaining actions are simply omitted
/// from the returned vector) as soon as a non-success outcome belongs to an
/// action for which `Action::is_critical()` is true — Open Question (a)'s
/// resolution governs this check, not the plan-level `safety_level` alone.
pub async fn execute_plan(
    plan: &Plan,
    action_client: &ActionClient,
    timeout: Duration,
) -> Vec<ActionOutcome> {
    let mut outcomes = Vec::with_capacity(plan.actions.len());

    for action in &plan.actions {
        let outcome = dispatch_one(action, action_client, timeout).await;
        let failed = outcome.status != OutcomeStatus::Success;
        let stop = failed && action.is_critical();

        if failed {
            warn!(
                action = %action.tool,
                status = ?outcome.status,
                critical = action.is_critical(),
                "action did not succeed"
            );
        }

        outcomes.push(outcome);

        if stop {
            break;
        }
    }

    outcomes
}

async fn dispatch_one(
    action: &Action,
    action_client: &ActionClient,
    timeout: Duration,
) -> ActionOutcome {
    let start = Instant::now();

    match tokio::time::timeout(timeout, action_client.execute(action)).await {
        Ok(Ok(result)) => {
            let status = if result.status == "success" {
                OutcomeStatus::Success
            } else {
                OutcomeStatus::Error
            };
            ActionOutcome {
                action: action.tool.clone(),
                status,
                result: result.result,
                error: result.error,
                execution_time_s: start.elapsed().as_secs_f64(),
                timestamp: now_rfc3339(),
            }
        }
        Ok(Err(client_err)) => ActionOutcome {
            action: action.tool.clone(),
            status: OutcomeStatus::Error,
            result: None,
            error: Some(client_err.to_string()),
            execution_time_s: start.elapsed().as_secs_f64(),
            timestamp: now_rfc3339(),
        },
        Err(_elapsed) => ActionOutcome {
            action: action.tool.clone(),
            status: OutcomeStatus::Timeout,
            result: None,
            error: Some(format!("action timed out after {}s", timeout.as_secs_f64())),
            execution_time_s: timeout.as_secs_f64(),
            timestamp: now_rfc3339(),
        },
    }
}
