// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use regex::Regex;

use runa_config::ToolsConfig;
use runa_model::ToolCall;

/// Decides whether a tool call must be confirmed by the user.
///
/// With `is_chat_mode == false` approval is never required, whatever the
/// implementation would otherwise say; callers that leave the policy unset
/// get the same behaviour.
pub trait ApprovalPolicy: Send + Sync {
    fn should_require_approval(&self, call: &ToolCall, is_chat_mode: bool) -> bool;
}

/// Collects one approval decision from the user.
///
/// Blocks until the user decides or the surrounding run is cancelled.  An
/// `Err` means the collection mechanism itself failed (disconnected UI,
/// closed channel) — not a rejection.
#[async_trait]
pub trait ApprovalRequester: Send + Sync {
    async fn request_approval(&self, call: &ToolCall) -> anyhow::Result<bool>;
}

/// Pattern-based approval policy: tool names matching any auto-approve
/// pattern run without prompting, everything else requires approval.
#[derive(Debug)]
pub struct PatternApprovalPolicy {
    auto_patterns: Vec<Regex>,
}

impl PatternApprovalPolicy {
    pub fn from_config(cfg: &ToolsConfig) -> Self {
        Self {
            auto_patterns: cfg
                .auto_approve_patterns
                .iter()
                .filter_map(|p| glob_to_regex(p))
                .collect(),
        }
    }
}

impl ApprovalPolicy for PatternApprovalPolicy {
    fn should_require_approval(&self, call: &ToolCall, is_chat_mode: bool) -> bool {
        if !is_chat_mode {
            return false;
        }
        !self.auto_patterns.iter().any(|re| re.is_match(&call.name))
    }
}

/// Convert a simple shell glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with(auto: &[&str]) -> PatternApprovalPolicy {
        PatternApprovalPolicy::from_config(&ToolsConfig {
            auto_approve_patterns: auto.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn call(name: &str) -> ToolCall {
        ToolCall { id: "c".into(), name: name.into(), arguments: "{}".into() }
    }

    // ── Chat-mode gate ────────────────────────────────────────────────────────

    #[test]
    fn non_chat_mode_never_requires_approval() {
        let p = policy_with(&[]);
        assert!(!p.should_require_approval(&call("delete_everything"), false));
    }

    // ── Auto-approve patterns ─────────────────────────────────────────────────

    #[test]
    fn matching_pattern_skips_approval() {
        let p = policy_with(&["read_*"]);
        assert!(!p.should_require_approval(&call("read_file"), true));
    }

    #[test]
    fn non_matching_tool_requires_approval() {
        let p = policy_with(&["read_*"]);
        assert!(p.should_require_approval(&call("write_file"), true));
    }

    #[test]
    fn question_mark_matches_exactly_one_char() {
        let p = policy_with(&["ls?"]);
        assert!(!p.should_require_approval(&call("lsx"), true));
        assert!(p.should_require_approval(&call("lsxy"), true));
    }

    #[test]
    fn empty_pattern_list_requires_approval_for_everything() {
        let p = policy_with(&[]);
        assert!(p.should_require_approval(&call("anything"), true));
    }

    #[test]
    fn pattern_is_anchored() {
        let p = policy_with(&["ls"]);
        assert!(p.should_require_approval(&call("ls_recursive"), true));
    }
}
