//! C3: the safety validator. Pure, synchronous, and deliberately dumb — it
//! only ever sees the `Plan` produced by C2, never talks to a collaborator,
//! and its verdict is the sole gate between a generated plan and C4
//! execution (`spec.md` §4.3).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use platform::errors::PlatformError;
use shared_types::{Plan, SafetyLevel, ValidationVerdict};

/// Per-tool override loaded from the policy file: a declared safety level
/// and whether dispatching this tool should carry `requires_confirmation`
/// regardless of what the model's plan says.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ToolPolicy {
    #[serde(default)]
    pub level: SafetyLevel,
    #[serde(default)]
    pub requires_confirmation: bool,
}

/// `action_type -> tool -> policy`, plus the dangerous-command substrings
/// screened for `execute_command` actions. Matches the YAML shape described
/// in `spec.md` §4.3: "a document mapping action_type -> tool -> {level,
/// requires_confirmation}".
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Policy {
    #[serde(default)]
    pub actions: HashMap<String, HashMap<String, ToolPolicy>>,
    #[serde(default = "default_dangerous_patterns")]
    pub dangerous_patterns: Vec<String>,
}

fn default_dangerous_patterns() -> Vec<String> {
    vec![
        "rm -rf".to_string(),
        "dd if=".to_string(),
        "mkfs".to_string(),
        "> /dev".to_string(),
        ":(){:|:&};:".to_string(),
    ]
}

impl Policy {
    /// Built-in defaults, used when no policy file is present at all
    /// (`Policy::load` returns this for a missing path, not an error).
    pub fn default_policy() -> Self {
        let mut system_action = HashMap::new();
        system_action.insert(
            "open_app".to_string(),
            ToolPolicy {
                level: SafetyLevel::Low,
                requires_confirmation: false,
            },
        );
        system_action.insert(
            "execute_command".to_string(),
            ToolPolicy {
                level: SafetyLevel::Critical,
                requires_confirmation: true,
            },
        );

        let mut query_action = HashMap::new();
        query_action.insert(
            "search_web".to_string(),
            ToolPolicy {
                level: SafetyLevel::Low,
                requires_confirmation: false,
            },
        );

        let mut notify_action = HashMap::new();
        notify_action.insert(
            "send_notification".to_string(),
            ToolPolicy {
                level: SafetyLevel::Low,
                requires_confirmation: false,
            },
        );

        let mut actions = HashMap::new();
        actions.insert("system_action".to_string(), system_action);
        actions.insert("query_action".to_string(), query_action);
        actions.insert("notify_action".to_string(), notify_action);

        Policy {
            actions,
            dangerous_patterns: default_dangerous_patterns(),
        }
    }

    /// Loads from `path`; a missing file falls back to `default_policy()`
    /// (§4.3 "built-in defaults apply when the file is absent"). A file that
    /// exists but fails to parse is a fatal `Configuration` error — unlike
    /// the memory client, a malformed policy must not silently relax to
    /// defaults.
    pub fn load(path: &str) -> Result<Self, PlatformError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_yaml::from_str(&raw)
                .map_err(|e| PlatformError::Config(format!("malformed policy file {path}: {e}"))),
            Err(_) => Ok(Policy::default_policy()),
        }
    }

    fn policy_for(&self, action_type: &str, tool: &str) -> Option<&ToolPolicy> {
        self.actions.get(action_type)?.get(tool)
    }
}

/// C3 proper: an allow-list plus the loaded `Policy`, built once at startup
/// from `Config` and held behind an `Arc` for the process lifetime.
pub struct Validator {
    policy: Policy,
    allowed_actions: HashSet<String>,
    enable_sandbox: bool,
    max_concurrent_actions: usize,
}

impl Validator {
    pub fn new(
        policy: Policy,
        allowed_actions: Vec<String>,
        enable_sandbox: bool,
        max_concurrent_actions: usize,
    ) -> Self {
        Validator {
            policy,
            allowed_actions: allowed_actions.into_iter().collect(),
            enable_sandbox,
            max_concurrent_actions,
        }
    }

    /// Implements `spec.md` §4.3's rule order exactly: empty plan is
    /// trivially safe, then every action is checked against the allow-list,
    /// the sandbox gate, and (for `execute_command`) the dangerous-pattern
    /// screen, then the whole plan is checked against the concurrency cap.
    /// The first failing rule wins; `requires_confirmation` is only computed
    /// once every action has passed.
    pub fn validate(&self, plan: &Plan) -> ValidationVerdict {
        if plan.actions.is_empty() {
            return ValidationVerdict::safe("no actions");
        }

        for action in &plan.actions {
            if !self.allowed_actions.contains(&action.tool) {
                return ValidationVerdict::unsafe_(format!("'{}' not allowed", action.tool));
            }

            if action.safety_level == SafetyLevel::Critical && !self.enable_sandbox {
                return ValidationVerdict::unsafe_(format!(
                    "'{}' is critical but sandboxing is disabled",
                    action.tool
                ));
            }

            if action.tool == "execute_command" {
                if let Some(reason) = self.screen_command(action) {
                    return ValidationVerdict::unsafe_(reason);
                }
            }
        }

        if plan.actions.len() > self.max_concurrent_actions {
            return ValidationVerdict::unsafe_(format!(
                "plan has {} actions, exceeds the {} concurrency cap",
                plan.actions.len(),
                self.max_concurrent_actions
            ));
        }

        let requires_confirmation = plan.actions.iter().any(|action| {
            action.safety_level == SafetyLevel::Critical
                || self
                    .policy
                    .policy_for(&action.kind, &action.tool)
                    .map(|p| p.requires_confirmation)
                    .unwrap_or(false)
        });

        let mut verdict = ValidationVerdict::safe("ok");
        verdict.requires_confirmation = Some(requires_confirmation);
        verdict
    }

    fn screen_command(&self, action: &shared_types::Action) -> Option<String> {
        let command = action.arguments.get("command").and_then(Value::as_str)?;
        self.policy
            .dangerous_patterns
            .iter()
            .find(|pattern| command.contains(pattern.as_str()))
            .map(|pattern| format!("command matches disallowed pattern: {pattern}"))
    }
}
