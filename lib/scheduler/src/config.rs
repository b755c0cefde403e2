// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-priority queue policy configuration.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the queue does with a payload whose deadline has passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    /// Move the payload to the rejected queue; it is surfaced to the
    /// rejection sink on the next release.
    #[default]
    Reject,
    /// Defer the payload behind fresh requests instead of rejecting it.
    Delay,
}

/// Immutable admission policy for a single priority level.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned", build_fn(error = "QueuePolicyBuilderError"))]
#[serde(default)]
pub struct QueuePolicy {
    /// Action taken when a payload times out while queued.
    #[builder(default)]
    pub timeout_action: TimeoutAction,

    /// Timeout applied to payloads that carry none, in microseconds.
    /// 0 disables the default timeout.
    #[builder(default)]
    pub default_timeout_us: u64,

    /// Whether a payload may override `default_timeout_us` with its own
    /// timeout. An override of 0 means "no timeout".
    #[builder(default)]
    pub allow_timeout_override: bool,

    /// Upper bound on the live queue depth. An enqueue that would exceed it
    /// fails. 0 means unbounded.
    #[builder(default)]
    pub max_queue_size: usize,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            timeout_action: TimeoutAction::Reject,
            default_timeout_us: 0,
            allow_timeout_override: false,
            max_queue_size: 0,
        }
    }
}

impl QueuePolicy {
    /// Create a new builder for QueuePolicy.
    pub fn builder() -> QueuePolicyBuilder {
        QueuePolicyBuilder::default()
    }
}

/// Error type for QueuePolicyBuilder.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueuePolicyBuilderError {
    #[error("Uninitialized field: {0}")]
    UninitializedField(&'static str),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<derive_builder::UninitializedFieldError> for QueuePolicyBuilderError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        Self::UninitializedField(e.field_name())
    }
}

impl From<String> for QueuePolicyBuilderError {
    fn from(s: String) -> Self {
        Self::ValidationError(s)
    }
}

/// Per-level policy overrides keyed by priority level.
///
/// Keys outside the configured `1..=priority_levels` range are ignored at
/// queue construction.
pub type QueuePolicyMap = HashMap<u32, QueuePolicy>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let policy = QueuePolicy::builder().build().unwrap();
        assert_eq!(policy, QueuePolicy::default());
        assert_eq!(policy.timeout_action, TimeoutAction::Reject);
        assert_eq!(policy.default_timeout_us, 0);
        assert!(!policy.allow_timeout_override);
        assert_eq!(policy.max_queue_size, 0);
    }

    #[test]
    fn test_builder_overrides() {
        let policy = QueuePolicy::builder()
            .timeout_action(TimeoutAction::Delay)
            .default_timeout_us(5_000)
            .allow_timeout_override(true)
            .max_queue_size(64)
            .build()
            .unwrap();
        assert_eq!(policy.timeout_action, TimeoutAction::Delay);
        assert_eq!(policy.default_timeout_us, 5_000);
        assert!(policy.allow_timeout_override);
        assert_eq!(policy.max_queue_size, 64);
    }

    #[test]
    fn test_policy_serde_round_trip() {
        let policy = QueuePolicy::builder()
            .timeout_action(TimeoutAction::Delay)
            .default_timeout_us(100)
            .build()
            .unwrap();
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"delay\""));
        let back: QueuePolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn test_policy_deserialize_partial() {
        let policy: QueuePolicy = serde_json::from_str(r#"{"max_queue_size": 8}"#).unwrap();
        assert_eq!(policy.max_queue_size, 8);
        assert_eq!(policy.timeout_action, TimeoutAction::Reject);
    }
}
