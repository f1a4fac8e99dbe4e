// SPDX-License-Identifier: AGPL-3.0-or-later

//! A queue is one accepted TCP connection carrying one NVMe/TCP queue
//! pair (admin or I/O). It owns the socket halves, the command-slot
//! pool, the two caravans, and the small amount of state that survives
//! across `recv_pass`/`send_pass` invocations.
//!
//! Generic over the socket halves (`R`, `W`) so tests can drive a
//! queue over an in-memory duplex pipe instead of a real `TcpStream`.

pub mod caravan;
pub mod recv;
pub mod send;
pub mod setup;
pub mod slot;
pub mod teardown;

use std::collections::{HashMap, VecDeque};

use bytes::BytesMut;
use tokio::sync::{Mutex, mpsc};

use crate::{
    backend::{Completion, SubmissionHandle},
    queue::{caravan::Caravan, slot::SlotPool},
};

/// Lifecycle of a queue, guarded by a short-held lock so the registry
/// and teardown path can observe it without contending with the I/O
/// worker's per-PDU work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Connecting,
    Live,
    Disconnecting,
}

pub struct Queue<R, W> {
    pub qid: u16,
    pub reader: R,
    pub writer: W,

    pub pool: SlotPool,
    pub caravan_large: Caravan,
    pub caravan_small: Caravan,

    /// Reusable scratch buffer for the variable-length tail of an
    /// inbound PDU (type-specific header + data + digests), replacing
    /// the original source's per-connection `page_frag_cache`.
    pub recv_scratch: BytesMut,

    /// Slots whose send side has work pending, in the order they
    /// became ready. A `VecDeque` stands in for the original source's
    /// intrusive singly linked "response list".
    pub send_list: VecDeque<u16>,

    /// Slots whose terminal segment landed in `caravan_large`/
    /// `caravan_small` respectively, freed once that caravan's flush
    /// confirms the segment actually left. A command's non-terminal
    /// segments (e.g. the data PDUs of a read, before its rsp) are
    /// never listed here — only the one push that finishes the
    /// command, so a command that crosses caravans (data in large,
    /// response in small) is freed exactly once.
    pub free_after_large: Vec<u16>,
    pub free_after_small: Vec<u16>,

    pub hdr_digest: bool,
    pub data_digest: bool,
    pub inline_data_size: u32,

    /// Outstanding `submit`/`complete_local` calls awaiting their
    /// `Completion`, keyed by the handle the backend was given. Removed
    /// the moment a completion for that handle is applied, so a handle
    /// never resolves to more than one slot over its lifetime.
    pub inflight: HashMap<SubmissionHandle, u16>,

    pub completions: mpsc::Receiver<Completion>,

    pub state: Mutex<QueueState>,
}

impl<R, W> Queue<R, W> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        qid: u16,
        reader: R,
        writer: W,
        slot_capacity: u16,
        inline_data_size: u32,
        completions: mpsc::Receiver<Completion>,
    ) -> Self {
        Queue {
            qid,
            reader,
            writer,
            pool: SlotPool::new(slot_capacity),
            caravan_large: Caravan::large(),
            caravan_small: Caravan::small(),
            recv_scratch: BytesMut::new(),
            send_list: VecDeque::new(),
            free_after_large: Vec::new(),
            free_after_small: Vec::new(),
            hdr_digest: false,
            data_digest: false,
            inline_data_size,
            inflight: HashMap::new(),
            completions,
            state: Mutex::new(QueueState::Connecting),
        }
    }

    pub async fn mark_live(&self) {
        *self.state.lock().await = QueueState::Live;
    }

    pub async fn is_live(&self) -> bool {
        matches!(*self.state.lock().await, QueueState::Live)
    }
}
