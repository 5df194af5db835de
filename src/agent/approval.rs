use crate::planner::CommandDraft;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// A command that may run without asking, optionally limited to a set of
/// subcommands (`git` with `["status", "log"]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    pub name: String,
    #[serde(default)]
    pub subcommands: Vec<String>,
}

/// Why a command was approved without a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalSource {
    Allowlist,
    Session,
    Flag,
}

/// Answer to the interactive approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumanDecision {
    ApproveOnce,
    ApproveSession,
    Reject,
}

impl HumanDecision {
    /// Anything unrecognized declines.
    pub fn parse(answer: &str) -> Self {
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" | "1" => Self::ApproveOnce,
            "a" | "always" | "2" => Self::ApproveSession,
            _ => Self::Reject,
        }
    }

    pub fn approved(self) -> bool {
        !matches!(self, Self::Reject)
    }
}

/// Approval state for one session: the static allowlist, signatures the
/// human approved for the session, and the auto-approve flag.
#[derive(Debug, Clone, Default)]
pub struct ApprovalManager {
    allowlist: Vec<AllowlistEntry>,
    session: HashSet<String>,
    auto_approve: bool,
}

impl ApprovalManager {
    pub fn new(allowlist: Vec<AllowlistEntry>, auto_approve: bool) -> Self {
        Self {
            allowlist,
            session: HashSet::new(),
            auto_approve,
        }
    }

    pub fn auto_approve(&self) -> bool {
        self.auto_approve
    }

    /// Flip the auto-approve flag and return its new value.
    pub fn toggle_auto_approve(&mut self) -> bool {
        self.auto_approve = !self.auto_approve;
        self.auto_approve
    }

    /// Checked in order: allowlist, session approvals, flag.
    pub fn check(&self, draft: &CommandDraft) -> Option<ApprovalSource> {
        let source = if is_preapproved(draft, &self.allowlist) {
            Some(ApprovalSource::Allowlist)
        } else if self.session.contains(&draft.signature()) {
            Some(ApprovalSource::Session)
        } else if self.auto_approve {
            Some(ApprovalSource::Flag)
        } else {
            None
        };
        debug!(source = ?source, "approval.check");
        source
    }

    /// Apply a human answer; session approvals remember the signature.
    pub fn record(&mut self, decision: HumanDecision, draft: &CommandDraft) {
        if decision == HumanDecision::ApproveSession {
            self.session.insert(draft.signature());
        }
    }

    pub fn is_session_approved(&self, draft: &CommandDraft) -> bool {
        self.session.contains(&draft.signature())
    }
}

/// Whether `draft` matches the allowlist and contains nothing that could
/// chain, substitute, redirect, or escalate.
pub fn is_preapproved(draft: &CommandDraft, allowlist: &[AllowlistEntry]) -> bool {
    let shell = draft.shell.trim().to_lowercase();
    if !matches!(shell.as_str(), "" | "bash" | "sh") {
        return false;
    }

    let run = draft.run.trim();
    if !is_command_string_safe(run) {
        return false;
    }

    let tokens: Vec<&str> = run.split_whitespace().collect();
    let Some(&first) = tokens.first() else {
        return false;
    };
    let base = first.rsplit('/').next().unwrap_or(first);
    let Some(entry) = allowlist.iter().find(|entry| entry.name == base) else {
        return false;
    };

    if !entry.subcommands.is_empty() {
        let subcommand = tokens[1..]
            .iter()
            .find(|token| !token.starts_with('-'))
            .copied()
            .unwrap_or("");
        if !entry.subcommands.iter().any(|allowed| allowed == subcommand) {
            return false;
        }
    }

    !has_mutating_arguments(base, &tokens[1..])
}

fn is_command_string_safe(run: &str) -> bool {
    if run.is_empty() || run.contains(['\n', '\r']) {
        return false;
    }

    // Chaining, substitution, here-docs and background execution.
    const FORBIDDEN: [&str; 9] = [";", "&", "|", "`", "$(", "${", "<(", ">(", "<<"];
    if FORBIDDEN.iter().any(|pattern| run.contains(pattern)) {
        return false;
    }

    // Any output redirection writes somewhere.
    if run.contains('>') {
        return false;
    }

    run.split_whitespace().next() != Some("sudo")
}

fn has_mutating_arguments(base: &str, args: &[&str]) -> bool {
    match base {
        "sed" => args
            .iter()
            .any(|arg| *arg == "--in-place" || arg.starts_with("-i")),
        "find" => args
            .iter()
            .any(|arg| matches!(*arg, "-exec" | "-execdir" | "-ok" | "-okdir" | "-delete")),
        _ => false,
    }
}
