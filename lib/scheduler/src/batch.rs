// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Dynamic batch assembly over the pending-batch cursor.

use derive_builder::Builder;

use crate::payload::Payload;
use crate::queue::PriorityQueue;
use crate::shapes::{EnforceEqualShapeTensors, PendingBatchShapes, ShapeTensorPeek};

/// Configuration for one model's batch assembly.
#[derive(Debug, Clone, Default, Builder)]
#[builder(pattern = "owned", build_fn(error = "BatchConfigBuilderError"))]
pub struct BatchConfig {
    /// Upper bound on the summed batch size of an assembled batch.
    /// 0 disables the cap.
    #[builder(default)]
    pub max_batch_size: usize,

    /// Tensors whose shapes gate admission into a batch.
    #[builder(default)]
    pub enforce_equal_shape_tensors: EnforceEqualShapeTensors,

    /// Runner the assembled batch is destined for, passed through to shape
    /// peeks.
    #[builder(default)]
    pub runner_id: i64,
}

impl BatchConfig {
    /// Create a new builder for BatchConfig.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }
}

/// Error type for BatchConfigBuilder.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BatchConfigBuilderError {
    #[error("Uninitialized field: {0}")]
    UninitializedField(&'static str),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<derive_builder::UninitializedFieldError> for BatchConfigBuilderError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        Self::UninitializedField(e.field_name())
    }
}

impl From<String> for BatchConfigBuilderError {
    fn from(s: String) -> Self {
        Self::ValidationError(s)
    }
}

/// Outcome of one assembly pass over the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingBatch {
    /// Payloads in the validated prefix.
    pub count: usize,
    /// Sum of per-payload batch sizes across the prefix.
    pub total_batch_size: usize,
    /// Oldest arrival in the prefix; `u64::MAX` when the prefix is empty.
    pub oldest_enqueue_time_ns: u64,
    /// Closest deadline in the prefix; `u64::MAX` when none carries one.
    pub closest_timeout_ns: u64,
    /// Total batch size of payloads rejected by timeout policy during the
    /// pass.
    pub rejected_batch_size: usize,
}

/// One speculative batch-assembly pass over a [`PriorityQueue`].
///
/// Walks the head of the queue with the cursor, realizing timeouts and
/// gating admission on tensor-shape compatibility, then either commits the
/// validated prefix (dequeuing it) or abandons the attempt. Holding the
/// queue mutably for the whole pass keeps the cursor valid between
/// [`assemble`](Self::assemble) and [`commit`](Self::commit).
pub struct BatchAssembler<'a, R> {
    queue: &'a mut PriorityQueue<R>,
    config: &'a BatchConfig,
}

impl<'a, R> BatchAssembler<'a, R> {
    pub fn new(queue: &'a mut PriorityQueue<R>, config: &'a BatchConfig) -> Self {
        Self { queue, config }
    }

    /// Build the largest admissible batch prefix at the head of the queue.
    ///
    /// The committed batch must be a queue prefix, so assembly stops at the
    /// first payload that fails the shape gate (or would exceed
    /// `max_batch_size`) rather than skipping over it. A payload whose
    /// shape peek fails is likewise left queued; a separate validation path
    /// is expected to reject it.
    pub fn assemble(&mut self, peek: &impl ShapeTensorPeek<R>) -> PendingBatch {
        self.queue.reset_cursor();
        let mut rejected_batch_size = self.queue.apply_policy_at_cursor();

        let mut pending_shapes: Option<PendingBatchShapes> = None;
        let mut total_batch_size = 0usize;

        while !self.queue.cursor_end() {
            let payload = self.queue.payload_at_cursor();
            let payload_batch_size = payload.batch_size() as usize;
            if self.config.max_batch_size > 0
                && total_batch_size + payload_batch_size > self.config.max_batch_size
            {
                break;
            }

            let admitted = if let Some(shapes) = pending_shapes.as_mut() {
                shapes.matches(self.config.runner_id, payload, peek)
                    && shapes.widen(self.config.runner_id, payload, peek).is_ok()
            } else {
                match PendingBatchShapes::init(
                    self.config.runner_id,
                    payload,
                    &self.config.enforce_equal_shape_tensors,
                    peek,
                ) {
                    Ok(shapes) => {
                        pending_shapes = Some(shapes);
                        true
                    }
                    Err(error) => {
                        tracing::debug!(
                            correlation_id = %payload.correlation_id(),
                            %error,
                            "shape peek failed, stopping batch growth"
                        );
                        false
                    }
                }
            };
            if !admitted {
                break;
            }

            self.queue.advance_cursor();
            total_batch_size += payload_batch_size;
            rejected_batch_size += self.queue.apply_policy_at_cursor();
        }

        PendingBatch {
            count: self.queue.pending_batch_count(),
            total_batch_size,
            oldest_enqueue_time_ns: self.queue.oldest_enqueue_time_ns(),
            closest_timeout_ns: self.queue.closest_timeout_ns(),
            rejected_batch_size,
        }
    }

    /// Dequeue the assembled prefix.
    pub fn commit(self) -> Vec<Payload<R>> {
        let count = self.queue.pending_batch_count();
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            match self.queue.dequeue() {
                Ok(payload) => batch.push(payload),
                Err(_) => break,
            }
        }
        batch
    }

    /// Back off without dequeuing anything.
    pub fn abandon(self) {
        self.queue.reset_cursor();
    }
}
