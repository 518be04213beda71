//! Trigger matching and evaluation.

use gantry_core::workflow::{EventType, TriggerRule, WorkflowDescription};

/// Event that can start a pipeline run.
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    Push { branch: String },
    PullRequest { target_branch: String },
}

impl TriggerEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            TriggerEvent::Push { .. } => EventType::Push,
            TriggerEvent::PullRequest { .. } => EventType::PullRequest,
        }
    }

    /// Branch the event targets.
    pub fn branch(&self) -> &str {
        match self {
            TriggerEvent::Push { branch } => branch,
            TriggerEvent::PullRequest { target_branch } => target_branch,
        }
    }
}

/// Decide whether `event` should start a run of `workflow`.
///
/// Pure and deterministic: rules are ORed, a rule matches when its event
/// type matches and the target branch matches one of its patterns. An
/// event matching no rule simply does not start a run.
pub fn should_run(event: &TriggerEvent, workflow: &WorkflowDescription) -> bool {
    workflow
        .triggers
        .iter()
        .any(|rule| rule_matches(rule, event))
}

fn rule_matches(rule: &TriggerRule, event: &TriggerEvent) -> bool {
    rule.event == event.event_type() && branch_matches(&rule.branches, event.branch())
}

fn branch_matches(patterns: &[String], branch: &str) -> bool {
    if patterns.is_empty() {
        return true; // Match all branches if no patterns specified
    }
    patterns.iter().any(|p| glob_match(p, branch))
}

fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return text.starts_with(prefix);
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        let prefix_slash = format!("{}/", prefix);
        if text.starts_with(&prefix_slash) {
            return !text[prefix_slash.len()..].contains('/');
        }
        return false;
    }
    if pattern.contains('*') {
        let parts: Vec<&str> = pattern.split('*').collect();
        if parts.len() == 2 {
            return text.starts_with(parts[0]) && text.ends_with(parts[1]);
        }
    }
    pattern == text
}
