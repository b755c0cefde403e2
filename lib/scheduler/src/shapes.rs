// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tensor-shape compatibility tracking for the pending batch.

use std::collections::HashMap;

use crate::error::ShapePeekError;
use crate::payload::Payload;

/// Dimensions of one tensor, as reported by the shape-peek oracle.
pub type TensorShape = Vec<i64>;

/// Tensor name to allow-ragged flag.
///
/// Listed tensors gate batch admission: when the flag is false all payloads
/// in a batch must agree exactly on the tensor's shape; when true the shape
/// may vary and the runner pads to the widest.
pub type EnforceEqualShapeTensors = HashMap<String, bool>;

/// Shape-peek oracle supplied by the model configuration layer.
///
/// A pure read of a payload's declared tensor shape by name, for the runner
/// the batch is destined for. May fail only when the request does not carry
/// the named tensor. Implemented for every matching `Fn`, so plain
/// functions and closures both satisfy it.
pub trait ShapeTensorPeek<R>:
    Fn(i64, &Payload<R>, &str) -> Result<TensorShape, ShapePeekError>
{
}

impl<R, F> ShapeTensorPeek<R> for F where
    F: Fn(i64, &Payload<R>, &str) -> Result<TensorShape, ShapePeekError>
{
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ShapeBounds {
    min: TensorShape,
    max: TensorShape,
    allow_ragged: bool,
}

/// Per-tensor (min, max) shape bounds observed across the pending batch.
///
/// Initialized from the batch's first payload, consulted for every
/// candidate, and widened as ragged payloads are admitted.
#[derive(Debug, Clone, Default)]
pub struct PendingBatchShapes {
    shapes: HashMap<String, ShapeBounds>,
}

impl PendingBatchShapes {
    /// Seed the bounds from the batch's first payload.
    ///
    /// Peeks every tensor listed in `enforce_equal_shape_tensors` and stores
    /// its shape as both min and max. Fails when the oracle cannot find a
    /// listed tensor in the request.
    pub fn init<R>(
        runner_id: i64,
        payload: &Payload<R>,
        enforce_equal_shape_tensors: &EnforceEqualShapeTensors,
        peek: &impl ShapeTensorPeek<R>,
    ) -> Result<Self, ShapePeekError> {
        let mut shapes = HashMap::with_capacity(enforce_equal_shape_tensors.len());
        for (tensor, &allow_ragged) in enforce_equal_shape_tensors {
            let shape = peek(runner_id, payload, tensor)?;
            shapes.insert(
                tensor.clone(),
                ShapeBounds {
                    min: shape.clone(),
                    max: shape,
                    allow_ragged,
                },
            );
        }
        Ok(Self { shapes })
    }

    /// Whether `payload` is shape-compatible with the pending batch.
    ///
    /// Strict tensors must match the stored shape exactly; ragged tensors
    /// must agree on rank and fall element-wise within the stored bounds.
    /// Any peek failure counts as a mismatch.
    pub fn matches<R>(
        &self,
        runner_id: i64,
        payload: &Payload<R>,
        peek: &impl ShapeTensorPeek<R>,
    ) -> bool {
        for (tensor, bounds) in &self.shapes {
            let Ok(shape) = peek(runner_id, payload, tensor) else {
                return false;
            };
            if bounds.allow_ragged {
                if shape.len() != bounds.min.len() {
                    return false;
                }
                let within = shape
                    .iter()
                    .zip(bounds.min.iter().zip(bounds.max.iter()))
                    .all(|(dim, (min, max))| dim >= min && dim <= max);
                if !within {
                    return false;
                }
            } else if shape != bounds.min {
                return false;
            }
        }
        true
    }

    /// Widen the ragged bounds to cover `payload`, admitting it into the
    /// pending batch. Strict bounds never move.
    pub fn widen<R>(
        &mut self,
        runner_id: i64,
        payload: &Payload<R>,
        peek: &impl ShapeTensorPeek<R>,
    ) -> Result<(), ShapePeekError> {
        for (tensor, bounds) in &mut self.shapes {
            if !bounds.allow_ragged {
                continue;
            }
            let shape = peek(runner_id, payload, tensor)?;
            for (i, dim) in shape.iter().enumerate() {
                if let Some(min) = bounds.min.get_mut(i) {
                    *min = (*min).min(*dim);
                }
                if let Some(max) = bounds.max.get_mut(i) {
                    *max = (*max).max(*dim);
                }
            }
        }
        Ok(())
    }

    /// Number of tracked tensors.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}
