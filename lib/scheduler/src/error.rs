// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error surface of the admission queue core.

use std::fmt;

use crate::payload::Payload;

/// Errors returned by [`PriorityQueue::enqueue`](crate::PriorityQueue::enqueue).
///
/// The payload is never retained on a failed enqueue; both variants carry it
/// back so the caller can complete the request toward the client.
#[derive(thiserror::Error)]
pub enum EnqueueError<R> {
    /// The priority level's live queue is at its configured capacity.
    #[error("queue for priority {priority} is at capacity ({max_queue_size})")]
    QueueFull {
        priority: u32,
        max_queue_size: usize,
        payload: Payload<R>,
    },

    /// No queue is configured for the requested priority level.
    #[error("no queue configured for priority {priority}")]
    UnknownPriority { priority: u32, payload: Payload<R> },
}

impl<R> EnqueueError<R> {
    /// Recover the payload that failed admission.
    pub fn into_payload(self) -> Payload<R> {
        match self {
            EnqueueError::QueueFull { payload, .. } => payload,
            EnqueueError::UnknownPriority { payload, .. } => payload,
        }
    }
}

impl<R> fmt::Debug for EnqueueError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueError::QueueFull {
                priority,
                max_queue_size,
                payload,
            } => f
                .debug_struct("QueueFull")
                .field("priority", priority)
                .field("max_queue_size", max_queue_size)
                .field("payload", payload)
                .finish(),
            EnqueueError::UnknownPriority { priority, payload } => f
                .debug_struct("UnknownPriority")
                .field("priority", priority)
                .field("payload", payload)
                .finish(),
        }
    }
}

/// Errors returned by [`PriorityQueue::dequeue`](crate::PriorityQueue::dequeue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DequeueError {
    /// No live payload remains in any priority level.
    #[error("queue is empty")]
    Empty,
}

/// The one failure the shape-peek oracle may report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapePeekError {
    /// The request does not carry the named input tensor.
    #[error("input tensor '{tensor}' not found in request")]
    TensorNotFound { tensor: String },
}
