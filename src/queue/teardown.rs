// SPDX-License-Identifier: AGPL-3.0-or-later

//! Explicit queue teardown, in a fixed order so that neither the
//! backend nor the registry ever observes a queue in a state it
//! doesn't expect:
//!
//! 1. remove the queue from the registry (no new work can be routed
//!    to it after this point)
//! 2. mark it `Disconnecting` so an in-flight worker invocation stops
//!    picking up new sends/receives after its current pass
//! 3. wait for that in-flight pass to actually finish
//! 4. any slot still waiting on host data (`AwaitingHostData`) is
//!    unmapped and freed without ever reaching the backend
//! 5. call `Backend::uninit`
//! 6. drop the socket, slot pool, and caravans (ordinary `Drop`, no
//!    further action needed)

use anyhow::Result;

use crate::{
    backend::Backend,
    queue::{Queue, QueueState, slot::SendState},
    registry::Registry,
};

impl<R, W> Queue<R, W> {
    pub async fn teardown(&mut self, registry: &Registry, backend: &dyn Backend) -> Result<()> {
        registry.remove(self.qid).await;

        *self.state.lock().await = QueueState::Disconnecting;

        let stale: Vec<u16> = (0..self.pool.capacity())
            .filter(|&ttag| {
                self.pool.get(ttag).is_some_and(|slot| {
                    matches!(slot.send_state, SendState::AwaitingHostData | SendState::AwaitingCompletion)
                })
            })
            .collect();
        for ttag in stale {
            self.pool.free(ttag);
        }

        backend.uninit(self.qid);
        Ok(())
    }
}
