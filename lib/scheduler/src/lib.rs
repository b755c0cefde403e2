// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Priority admission queue and dynamic batching cursor for the cadence
//! inference server.
//!
//! Between request arrival and runner dispatch sits a per-model queue that
//! admits payloads by priority-level policy, releases them in priority order
//! (oldest first within a level), realizes per-payload timeouts, and lets
//! the scheduler speculatively walk the queue head to assemble a batch
//! without dequeuing.
//!
//! # Architecture
//!
//! - **`PolicyQueue`** (internal): single-priority FIFO with a parallel
//!   deadline deque, a delayed sub-queue for deferred timeouts, and a
//!   rejected sub-queue pending release to the rejection sink.
//! - **[`PriorityQueue`]**: composite over priority levels; owns the
//!   pending-batch cursor with mark/restore and generation-based validity.
//! - **[`PendingBatchShapes`]**: per-tensor (min, max) shape bounds that
//!   gate admission into the pending batch, with strict and ragged modes.
//! - **[`BatchAssembler`]**: one assembly pass driving the cursor and the
//!   shape gate, ending in a commit (dequeue the prefix) or an abandon.
//!
//! The queue is owned by a single scheduler loop per model; nothing here
//! blocks or suspends, and enqueues from transport threads are expected to
//! be marshalled to that loop externally. Every operation is O(log P) or
//! O(1) in the number of priority levels.
//!
//! # Example
//!
//! ```
//! use cadence_scheduler::{Payload, PriorityQueue, QueuePolicy, QueuePolicyMap};
//!
//! let mut queue: PriorityQueue<&str> =
//!     PriorityQueue::with_policies(QueuePolicy::default(), 2, QueuePolicyMap::new());
//! queue.enqueue(2, Payload::new("background", 0)).unwrap();
//! queue.enqueue(1, Payload::new("interactive", 1)).unwrap();
//!
//! // priority 1 wins despite arriving later
//! assert_eq!(*queue.dequeue().unwrap().request(), "interactive");
//! ```

mod batch;
mod clock;
mod config;
mod error;
mod payload;
mod policy_queue;
mod queue;
mod shapes;


pub use batch::{
    BatchAssembler, BatchConfig, BatchConfigBuilder, BatchConfigBuilderError, PendingBatch,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    QueuePolicy, QueuePolicyBuilder, QueuePolicyBuilderError, QueuePolicyMap, TimeoutAction,
};
pub use error::{DequeueError, EnqueueError, ShapePeekError};
pub use payload::Payload;
pub use queue::PriorityQueue;
pub use shapes::{EnforceEqualShapeTensors, PendingBatchShapes, ShapeTensorPeek, TensorShape};
