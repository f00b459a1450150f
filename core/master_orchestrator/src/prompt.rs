//! Fixed planning-prompt assembly. Headings are the contract with the LLM
//! (`spec.md` §6) — changing their order or text is a breaking change to
//! every deployed planning model, so this function has exactly one job:
//! reproduce the block verbatim.

use serde_json::{Map, Value};

const FALLBACK_SYSTEM_PROMPT: &str = "You are the planning module of an autonomous assistant. \
Given a user request, relevant context, and the available actions, respond with a single JSON \
execution plan and nothing else.";

/// Loaded once at startup; falls back to the built-in string when the file
/// is absent (mirrors `Policy`'s absent-file-is-defaults pattern in `safety.rs`).
pub fn load_system_prompt(path: &str) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|_| FALLBACK_SYSTEM_PROMPT.to_string())
}

/// Assembles the fixed-layout prompt: system prompt, user request, retrieved
/// memory context, allow-listed tool catalogue, current request context.
/// `memory_context` is the already-assembled `{relevant, preferences}` object
/// stage 1 builds (`spec.md` §4.5 stage 1), not the bare hit list.
pub fn build_planning_prompt(
    system_prompt: &str,
    user_content: &str,
    memory_context: &Value,
    allowed_actions: &[String],
    request_context: &Map<String, Value>,
) -> String {
    let memory_json =
        serde_json::to_string_pretty(memory_context).unwrap_or_else(|_| "{}".to_string());
    let actions_json =
        serde_json::to_string_pretty(allowed_actions).unwrap_or_else(|_| "[]".to_string());
    let state_json =
        serde_json::to_string_pretty(request_context).unwrap_or_else(|_| "{}".to_string());

    format!(
        "{system_prompt}\n\n\
## User Request\n{user_content}\n\n\
## Relevant Context\n{memory_json}\n\n\
## Available Actions\n{actions_json}\n\n\
## Current State\n{state_json}\n\n\
## Your Task\n\
Generate a JSON execution plan."
    )
}
