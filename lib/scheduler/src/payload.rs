// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Scheduler-side view of a pending inference request.

use std::fmt;

use uuid::Uuid;

/// A pending inference request as seen by the queue.
///
/// The queue routes the inner request `R` by value and never interprets it;
/// only the metadata carried here participates in admission, ordering, and
/// timeout decisions. Tensor shapes are read through the shape-peek oracle
/// supplied by the model configuration layer.
pub struct Payload<R> {
    correlation_id: Uuid,
    arrival_ns: u64,
    timeout_us: Option<u64>,
    batch_size: u32,
    request: R,
}

impl<R> Payload<R> {
    /// Wrap `request` with its monotonic arrival timestamp.
    pub fn new(request: R, arrival_ns: u64) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            arrival_ns,
            timeout_us: None,
            batch_size: 1,
            request,
        }
    }

    /// Set a per-request timeout, in microseconds.
    ///
    /// Honored only when the priority level's policy allows overrides.
    /// A value of 0 means "no timeout".
    pub fn with_timeout_us(mut self, timeout_us: u64) -> Self {
        self.timeout_us = Some(timeout_us);
        self
    }

    /// Set the number of logical samples this request contributes to a batch.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn arrival_ns(&self) -> u64 {
        self.arrival_ns
    }

    pub fn timeout_us(&self) -> Option<u64> {
        self.timeout_us
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn request(&self) -> &R {
        &self.request
    }

    /// Hand the inner request back, e.g. to a runner or the rejection sink.
    pub fn into_request(self) -> R {
        self.request
    }
}

impl<R> fmt::Debug for Payload<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("correlation_id", &self.correlation_id)
            .field("arrival_ns", &self.arrival_ns)
            .field("timeout_us", &self.timeout_us)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}
