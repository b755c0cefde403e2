// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Composite priority queue and the pending-batch cursor.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;

use crate::clock::{Clock, MonotonicClock};
use crate::config::{QueuePolicy, QueuePolicyMap};
use crate::error::{DequeueError, EnqueueError};
use crate::payload::Payload;
use crate::policy_queue::PolicyQueue;

/// Position and aggregate state of a speculative batch prefix.
///
/// The cursor addresses payloads by priority level and logical index; levels
/// are fixed at construction, so a (level, index) pair stays meaningful for
/// the queue's lifetime. `generation` snapshots the queue generation the
/// cursor was taken at: any mutation other than
/// [`PriorityQueue::apply_policy_at_cursor`] bumps the queue generation and
/// thereby invalidates outstanding cursors.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// Priority level the cursor is positioned in.
    level: u32,
    /// Logical index within that level, across live then delayed payloads.
    queue_idx: usize,
    /// Whether `queue_idx` has crossed into the delayed region.
    at_delayed_queue: bool,
    /// Payloads folded into the pending batch so far.
    pending_batch_count: usize,
    /// Min arrival timestamp over folded payloads; `u64::MAX` when none.
    pending_batch_oldest_enqueue_time_ns: u64,
    /// Min nonzero deadline over folded payloads; `u64::MAX` when none carry
    /// a deadline.
    pending_batch_closest_timeout_ns: u64,
    /// Queue generation this cursor was taken at.
    generation: u64,
}

impl Cursor {
    fn new(level: u32, generation: u64) -> Self {
        Self {
            level,
            queue_idx: 0,
            at_delayed_queue: false,
            pending_batch_count: 0,
            pending_batch_oldest_enqueue_time_ns: u64::MAX,
            pending_batch_closest_timeout_ns: u64::MAX,
            generation,
        }
    }
}

/// Priority admission queue for one model.
///
/// Routes payloads to per-priority `PolicyQueue`s (lower level = higher
/// priority), releases them in priority order with FIFO order within a
/// level, and carries the pending-batch cursor the scheduler uses to
/// assemble batches without dequeuing.
///
/// Not internally synchronized: the queue is owned by a single scheduler
/// loop per model, and no operation blocks.
pub struct PriorityQueue<R> {
    queues: BTreeMap<u32, PolicyQueue<R>>,

    /// Live payloads across all levels; rejected payloads are not counted.
    size: usize,

    /// Cached extremes so the dequeue scan rarely starts from the beginning.
    front_priority_level: u32,
    last_priority_level: u32,

    pending_cursor: Cursor,
    current_mark: Cursor,

    /// Bumped on every mutation that invalidates cursors.
    generation: u64,

    clock: Arc<dyn Clock>,
}

impl<R> PriorityQueue<R> {
    /// A queue with a single priority level 0 and a neutral policy; behaves
    /// as a plain FIFO.
    pub fn new() -> Self {
        Self::with_clock(
            QueuePolicy::default(),
            0,
            QueuePolicyMap::new(),
            Arc::new(MonotonicClock::new()),
        )
    }

    /// A queue with levels `1..=priority_levels`, each using its entry from
    /// `policy_overrides` or `default_policy`. Override keys outside the
    /// level range are ignored. `priority_levels == 0` gives the single
    /// level 0 of [`new`](Self::new).
    pub fn with_policies(
        default_policy: QueuePolicy,
        priority_levels: u32,
        policy_overrides: QueuePolicyMap,
    ) -> Self {
        Self::with_clock(
            default_policy,
            priority_levels,
            policy_overrides,
            Arc::new(MonotonicClock::new()),
        )
    }

    /// [`with_policies`](Self::with_policies) with an injected clock.
    pub fn with_clock(
        default_policy: QueuePolicy,
        priority_levels: u32,
        policy_overrides: QueuePolicyMap,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut queues = BTreeMap::new();
        if priority_levels == 0 {
            queues.insert(0, PolicyQueue::new(default_policy));
        } else {
            for level in 1..=priority_levels {
                let policy = policy_overrides
                    .get(&level)
                    .cloned()
                    .unwrap_or_else(|| default_policy.clone());
                queues.insert(level, PolicyQueue::new(policy));
            }
        }

        let first_level = queues.keys().next().copied().unwrap_or(0);
        let last_level = queues.keys().next_back().copied().unwrap_or(0);
        Self {
            queues,
            size: 0,
            front_priority_level: last_level,
            last_priority_level: last_level,
            pending_cursor: Cursor::new(first_level, 0),
            current_mark: Cursor::new(first_level, 0),
            generation: 0,
            clock,
        }
    }

    /// Admit `payload` at `priority_level`. Invalidates the cursor.
    pub fn enqueue(
        &mut self,
        priority_level: u32,
        payload: Payload<R>,
    ) -> Result<(), EnqueueError<R>> {
        let Some(queue) = self.queues.get_mut(&priority_level) else {
            return Err(EnqueueError::UnknownPriority {
                priority: priority_level,
                payload,
            });
        };

        let max_queue_size = queue.policy().max_queue_size;
        match queue.enqueue(payload) {
            Ok(()) => {
                self.size += 1;
                self.front_priority_level = self.front_priority_level.min(priority_level);
                self.last_priority_level = self.last_priority_level.max(priority_level);
                self.generation += 1;
                Ok(())
            }
            Err(payload) => Err(EnqueueError::QueueFull {
                priority: priority_level,
                max_queue_size,
                payload,
            }),
        }
    }

    /// Release the highest-priority live payload. Invalidates the cursor.
    ///
    /// Un-timed-out payloads of every level are preferred over delayed
    /// payloads of any level: a first pass scans live queues in ascending
    /// level order, and only when all are empty does a second pass scan the
    /// delayed queues in the same order.
    pub fn dequeue(&mut self) -> Result<Payload<R>, DequeueError> {
        if self.size == 0 {
            return Err(DequeueError::Empty);
        }

        let mut dequeued = None;
        for (_, queue) in self.queues.range_mut(self.front_priority_level..) {
            if queue.unexpired_len() > 0 {
                dequeued = queue.dequeue();
                break;
            }
        }
        if dequeued.is_none() {
            for (_, queue) in self.queues.iter_mut() {
                if queue.delayed_len() > 0 {
                    dequeued = queue.dequeue_delayed();
                    break;
                }
            }
        }

        let payload = match dequeued {
            Some(payload) => payload,
            None => {
                debug_assert!(false, "size is nonzero but no payload was found");
                return Err(DequeueError::Empty);
            }
        };

        self.size -= 1;
        self.generation += 1;
        match self.queues.iter().find(|(_, queue)| !queue.is_empty()) {
            Some((&level, _)) => self.front_priority_level = level,
            None => self.front_priority_level = self.last_priority_level,
        }
        Ok(payload)
    }

    /// Rejected payloads of every level, in ascending level order, moved out
    /// for the rejection sink.
    pub fn release_rejected_payloads(&mut self) -> Vec<VecDeque<Payload<R>>> {
        self.queues
            .values_mut()
            .map(|queue| queue.release_rejected_queue())
            .collect()
    }

    /// Live payloads across all levels. Rejected payloads are not counted.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Point the cursor at an empty pending batch at the head of the queue.
    /// Invalidates any previous mark.
    pub fn reset_cursor(&mut self) {
        self.generation += 1;
        let first_level = self.queues.keys().next().copied().unwrap_or(0);
        self.pending_cursor = Cursor::new(first_level, self.generation);
    }

    /// Snapshot the cursor. The mark stays restorable only while no
    /// enqueue, dequeue, or cursor reset intervenes.
    pub fn mark_cursor(&mut self) {
        self.current_mark = self.pending_cursor;
    }

    /// Restore the cursor to the last mark.
    pub fn set_cursor_to_mark(&mut self) {
        self.pending_cursor = self.current_mark;
    }

    /// Whether the pending batch is unchanged since the cursor was taken.
    pub fn is_cursor_valid(&self) -> bool {
        self.pending_cursor.generation == self.generation
    }

    /// Whether the cursor has stepped over every live payload.
    pub fn cursor_end(&self) -> bool {
        self.pending_cursor.pending_batch_count == self.size
    }

    /// Payload under the cursor. Must not be called when
    /// [`cursor_end`](Self::cursor_end) is true.
    pub fn payload_at_cursor(&self) -> &Payload<R> {
        debug_assert!(!self.cursor_end());
        self.queues[&self.pending_cursor.level].at(self.pending_cursor.queue_idx)
    }

    /// Fold the payload under the cursor into the pending batch and step to
    /// the next live payload. No-op at cursor end. Does not apply timeout
    /// policy; that is [`apply_policy_at_cursor`](Self::apply_policy_at_cursor)'s job.
    pub fn advance_cursor(&mut self) {
        if self.cursor_end() {
            return;
        }

        let level = self.pending_cursor.level;
        let Some(queue) = self.queues.get(&level) else {
            return;
        };

        let cursor = &mut self.pending_cursor;
        let deadline_ns = queue.timeout_at(cursor.queue_idx);
        if deadline_ns != 0 {
            cursor.pending_batch_closest_timeout_ns =
                cursor.pending_batch_closest_timeout_ns.min(deadline_ns);
        }
        cursor.pending_batch_oldest_enqueue_time_ns = cursor
            .pending_batch_oldest_enqueue_time_ns
            .min(queue.at(cursor.queue_idx).arrival_ns());
        cursor.pending_batch_count += 1;

        cursor.queue_idx += 1;
        if !cursor.at_delayed_queue && cursor.queue_idx >= queue.unexpired_len() {
            // the logical index continues through the delayed region
            cursor.at_delayed_queue = true;
        }
        if cursor.queue_idx >= queue.len() {
            // step to the next non-empty priority level
            let mut search = level;
            loop {
                match self
                    .queues
                    .range((Bound::Excluded(search), Bound::Unbounded))
                    .next()
                {
                    Some((&next_level, next_queue)) => {
                        search = next_level;
                        if !next_queue.is_empty() {
                            cursor.level = next_level;
                            cursor.queue_idx = 0;
                            cursor.at_delayed_queue = next_queue.unexpired_len() == 0;
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    /// Realize timeouts at the cursor position.
    ///
    /// Applies the level's timeout policy at the cursor's logical index,
    /// stepping across priority levels until an unexpired payload (or the
    /// end of the queue) is reached. This is the one mutation that keeps
    /// the cursor valid.
    ///
    /// Returns the total batch size of newly rejected payloads.
    pub fn apply_policy_at_cursor(&mut self) -> usize {
        let now_ns = self.clock.now_ns();
        let mut rejected_count = 0usize;
        let mut rejected_batch_size = 0usize;

        while !self.cursor_end() {
            let level = self.pending_cursor.level;
            let idx = self.pending_cursor.queue_idx;
            let Some(queue) = self.queues.get_mut(&level) else {
                break;
            };

            let count_before = rejected_count;
            let still_at_idx =
                queue.apply_policy(idx, now_ns, &mut rejected_count, &mut rejected_batch_size);
            let newly_rejected = rejected_count - count_before;
            let at_delayed = idx >= queue.unexpired_len();
            self.size -= newly_rejected;

            if still_at_idx {
                self.pending_cursor.at_delayed_queue = at_delayed;
                break;
            }

            match self
                .queues
                .range((Bound::Excluded(level), Bound::Unbounded))
                .next()
            {
                Some((&next_level, _)) => {
                    self.pending_cursor.level = next_level;
                    self.pending_cursor.queue_idx = 0;
                    self.pending_cursor.at_delayed_queue = false;
                }
                None => break,
            }
        }

        if rejected_count > 0 {
            tracing::debug!(rejected_count, rejected_batch_size, "rejected timed-out payloads");
        }
        rejected_batch_size
    }

    /// Payloads folded into the pending batch.
    pub fn pending_batch_count(&self) -> usize {
        self.pending_cursor.pending_batch_count
    }

    /// Oldest arrival timestamp in the pending batch; `u64::MAX` when the
    /// pending batch is empty.
    pub fn oldest_enqueue_time_ns(&self) -> u64 {
        self.pending_cursor.pending_batch_oldest_enqueue_time_ns
    }

    /// Closest deadline in the pending batch; `u64::MAX` when no folded
    /// payload carries one.
    pub fn closest_timeout_ns(&self) -> u64 {
        self.pending_cursor.pending_batch_closest_timeout_ns
    }
}

impl<R> Default for PriorityQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}
