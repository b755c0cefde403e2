// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Single-priority FIFO with timeout bookkeeping.

use std::collections::VecDeque;

use crate::config::{QueuePolicy, TimeoutAction};
use crate::payload::Payload;

/// FIFO for one priority level.
///
/// Live payloads sit in `queue` with a parallel deque of absolute deadlines.
/// A payload whose deadline passes is moved to `rejected_queue` or, under
/// [`TimeoutAction::Delay`], to `delayed_queue` where it waits behind fresh
/// requests. Logical indices used by [`at`](Self::at) and
/// [`apply_policy`](Self::apply_policy) run through `queue` then
/// `delayed_queue`; rejected payloads are not addressable.
pub(crate) struct PolicyQueue<R> {
    policy: QueuePolicy,

    /// Live payloads, front = oldest.
    queue: VecDeque<Payload<R>>,

    /// Absolute deadlines (ns) parallel to `queue`. 0 means no deadline.
    timeout_at: VecDeque<u64>,

    /// Payloads whose deadline passed under `Delay`. Drained after live
    /// payloads; they never expire a second time.
    delayed_queue: VecDeque<Payload<R>>,

    /// Rejected payloads pending release to the rejection sink.
    rejected_queue: VecDeque<Payload<R>>,
}

impl<R> PolicyQueue<R> {
    pub(crate) fn new(policy: QueuePolicy) -> Self {
        Self {
            policy,
            queue: VecDeque::new(),
            timeout_at: VecDeque::new(),
            delayed_queue: VecDeque::new(),
            rejected_queue: VecDeque::new(),
        }
    }

    pub(crate) fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    /// Append `payload` and compute its deadline.
    ///
    /// The payload's own timeout wins when the policy allows overrides (0
    /// meaning "no timeout"); otherwise `default_timeout_us` applies. Fails
    /// by handing the payload back when the live queue is at capacity.
    pub(crate) fn enqueue(&mut self, payload: Payload<R>) -> Result<(), Payload<R>> {
        if self.policy.max_queue_size > 0 && self.queue.len() >= self.policy.max_queue_size {
            return Err(payload);
        }

        let timeout_us = match (payload.timeout_us(), self.policy.allow_timeout_override) {
            (Some(us), true) => us,
            _ => self.policy.default_timeout_us,
        };
        let deadline_ns = if timeout_us == 0 {
            0
        } else {
            payload.arrival_ns() + timeout_us * 1_000
        };

        self.timeout_at.push_back(deadline_ns);
        self.queue.push_back(payload);
        Ok(())
    }

    /// Pop the oldest live payload. Never consults `delayed_queue`.
    pub(crate) fn dequeue(&mut self) -> Option<Payload<R>> {
        let payload = self.queue.pop_front()?;
        self.timeout_at.pop_front();
        Some(payload)
    }

    /// Pop the oldest delayed payload.
    pub(crate) fn dequeue_delayed(&mut self) -> Option<Payload<R>> {
        self.delayed_queue.pop_front()
    }

    /// Apply the timeout policy to the payload at logical index `idx`.
    ///
    /// Expired payloads at `idx` are moved out (to `rejected_queue` or
    /// `delayed_queue`) until the payload occupying `idx` is unexpired or
    /// `idx` no longer indexes a live payload. `rejected_count` and
    /// `rejected_batch_size` are incremented for newly rejected payloads
    /// only; delayed payloads do not count.
    ///
    /// Returns true iff a live payload still occupies `idx` afterwards.
    pub(crate) fn apply_policy(
        &mut self,
        idx: usize,
        now_ns: u64,
        rejected_count: &mut usize,
        rejected_batch_size: &mut usize,
    ) -> bool {
        while idx < self.queue.len() {
            let deadline_ns = self.timeout_at[idx];
            if deadline_ns == 0 || now_ns < deadline_ns {
                return true;
            }

            let Some(payload) = self.queue.remove(idx) else {
                break;
            };
            self.timeout_at.remove(idx);

            match self.policy.timeout_action {
                TimeoutAction::Reject => {
                    tracing::debug!(
                        correlation_id = %payload.correlation_id(),
                        deadline_ns,
                        "payload timed out, rejecting"
                    );
                    *rejected_count += 1;
                    *rejected_batch_size += payload.batch_size() as usize;
                    self.rejected_queue.push_back(payload);
                }
                TimeoutAction::Delay => {
                    tracing::debug!(
                        correlation_id = %payload.correlation_id(),
                        deadline_ns,
                        "payload timed out, delaying"
                    );
                    self.delayed_queue.push_back(payload);
                }
            }
        }

        // Past the live queue; delayed payloads never expire a second time.
        idx < self.len()
    }

    /// Deadline of the payload at logical index `idx`, in ns.
    ///
    /// 0 for payloads without a deadline and for the delayed region.
    pub(crate) fn timeout_at(&self, idx: usize) -> u64 {
        if idx < self.queue.len() {
            self.timeout_at[idx]
        } else {
            0
        }
    }

    /// Payload at logical index `idx` across `queue` then `delayed_queue`.
    pub(crate) fn at(&self, idx: usize) -> &Payload<R> {
        debug_assert!(idx < self.len());
        if idx < self.queue.len() {
            &self.queue[idx]
        } else {
            &self.delayed_queue[idx - self.queue.len()]
        }
    }

    /// Move the rejected payloads out, leaving the rejected queue empty.
    pub(crate) fn release_rejected_queue(&mut self) -> VecDeque<Payload<R>> {
        std::mem::take(&mut self.rejected_queue)
    }

    /// Live payloads: queued plus delayed. Rejected payloads are not counted.
    pub(crate) fn len(&self) -> usize {
        self.queue.len() + self.delayed_queue.len()
    }

    /// Live payloads that have not timed out.
    pub(crate) fn unexpired_len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn delayed_len(&self) -> usize {
        self.delayed_queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
