// SPDX-License-Identifier: AGPL-3.0-or-later

//! Minimal state-machine scaffolding used for short, linear handshakes
//! (connection setup) as opposed to the continuous, budget-bound work
//! loops (receive/send pipelines), which are driven directly by
//! `queue::worker` instead since their state lives in the queue itself
//! rather than in a per-invocation context.

use std::future::Future;

use anyhow::{Context, Result};

/// Drives a state machine to completion. Implemented by the context
/// type that owns the current state.
pub trait StateMachineCtx<Ctx, Res> {
    fn execute(&mut self) -> impl Future<Output = Result<Res>> + Send;
}

/// Helper used by `execute` implementations: takes the current state
/// out of an `Option`, with a consistent error if it was already taken
/// (which would mean `execute` was called re-entrantly).
pub fn take_state<S>(slot: &mut Option<S>) -> Result<S> {
    slot.take().context("state machine polled after completion")
}
