// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cooperative per-queue I/O worker. Each live queue runs as its own
//! `tokio` task; `IO_WORK_BUDGET` bounds how many PDUs (recv + send
//! combined) one iteration of the loop handles before yielding back to
//! the runtime, so a single very busy queue can't starve its
//! neighbors on the same worker thread.
//!
//! Completions pushed by the backend arrive on an `mpsc` channel
//! (`Queue::completions`); draining it is folded into the same
//! `tokio::select!` as the socket read so a read-side stall never
//! delays a completion that's ready to go out.

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    backend::{Backend, Completion},
    queue::{Queue, slot::SendState},
    registry::Registry,
};

pub const IO_WORK_BUDGET: usize = 64;

pub async fn run<R, W>(mut queue: Queue<R, W>, registry: Registry, backend: impl Backend) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let result = drive(&mut queue, &backend).await;
    if let Err(e) = &result {
        tracing::warn!(qid = queue.qid, "queue worker exiting: {e}");
    }
    let _ = queue.teardown(&registry, &backend).await;
    result
}

async fn drive<R, W>(queue: &mut Queue<R, W>, backend: &impl Backend) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut ops = 0usize;
    loop {
        if !queue.send_list.is_empty() {
            ops += queue.send_pass().await?;
        }

        if !queue.is_live().await {
            return Ok(());
        }

        if ops >= IO_WORK_BUDGET {
            ops = 0;
            tokio::task::yield_now().await;
            continue;
        }

        // A completion can arrive at any point in an in-flight recv
        // (the read half may be sitting in `.await` waiting on more
        // bytes from the peer, who in turn may be waiting on a send we
        // owe them, e.g. an r2t). Racing the two means a completion is
        // never stuck behind a recv that cannot progress until we send.
        tokio::select! {
            biased;
            completion = queue.completions.recv() => {
                if let Some(completion) = completion {
                    apply_completion(queue, completion);
                    ops += 1;
                }
            }
            progressed = queue.recv_one_pdu(backend) => {
                match progressed? {
                    true => ops += 1,
                    false => return Ok(()),
                }
            }
        }
    }
}

fn apply_completion<R, W>(queue: &mut Queue<R, W>, completion: Completion) {
    let Completion { handle, cid, cqe, read_data } = completion;
    let Some(ttag) = queue.inflight.remove(&handle) else {
        tracing::warn!(qid = queue.qid, cid, "completion for unknown submission handle, dropping");
        return;
    };
    let Some(slot) = queue.pool.get_mut(ttag) else { return };
    slot.cqe = cqe;
    slot.read_buf = read_data;
    slot.send_state = if slot.read_buf.is_some() { SendState::SendDataPdu } else { SendState::SendResponse };
    queue.send_list.push_back(ttag);
}
