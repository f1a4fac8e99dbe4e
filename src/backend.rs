// SPDX-License-Identifier: AGPL-3.0-or-later

//! The external collaborator this transport hands parsed NVMe commands
//! to. Actually executing a command (walking namespaces, touching
//! block storage, building a completion status) is out of scope for
//! this crate; what's in scope is the boundary a real backend must
//! satisfy, modeled on the registration surface of the kernel module
//! this transport is based on (`nvmet_fabrics_ops`): an `owner`/`type`/
//! `msdbd`/`has_keyed_sgls` identity plus a handful of entry points.
//!
//! A backend hands completions back asynchronously through the
//! [`Completion`] MPSC channel installed at [`Backend::install_queue`]
//! time — this is the one cross-thread handoff in the whole design
//! (see `queue::recv`/`queue::send` for the single-threaded parts).

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Transport identity this crate registers as. `msdbd` (maximum SGL
/// data block descriptors) is 1 because this transport never emits
/// keyed SGLs; `has_keyed_sgls` is therefore always false.
pub const NVMF_TRTYPE_I10: u8 = 0xFE;
pub const MSDBD: u8 = 1;
pub const HAS_KEYED_SGLS: bool = false;

/// Opaque handle returned by [`Backend::submit`], used only to let a
/// backend implementation correlate its own internal bookkeeping; this
/// crate never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionHandle(pub u64);

/// What a submitted command needs from the transport before (or after)
/// the backend can complete it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    /// No data phase (e.g. Flush, Identify with metadata already sent
    /// in-capsule).
    None,
    /// Write: host has more data to send. `transfer_len` is the number
    /// of bytes still needed after any in-capsule data already
    /// attached to the `cmd` PDU.
    NeedsHostData { transfer_len: u32 },
    /// Read: controller will produce data, delivered later via
    /// [`Completion::read_data`].
    ProducesControllerData { transfer_len: u32 },
}

/// Result of handing a freshly parsed command to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub handle: SubmissionHandle,
    pub direction: DataDirection,
}

/// A completion pushed back by the backend, asynchronously, on the
/// channel given to [`Backend::install_queue`]. `read_data` is `Some`
/// only for commands whose `direction` was `ProducesControllerData`.
///
/// `handle` is the same [`SubmissionHandle`] handed back by the
/// `submit`/`complete_local` call this completion answers, and is what
/// the transport actually uses to find the right slot — `cid` alone is
/// not a reliable correlator, since hosts reuse `cid` values as their
/// submission queue cycles and a freed slot's last `cid` can collide
/// with a live command's.
#[derive(Debug, Clone)]
pub struct Completion {
    pub handle: SubmissionHandle,
    pub cid: u16,
    pub cqe: [u8; 16],
    pub read_data: Option<Bytes>,
}

/// Reason a queue is being torn down from the backend's side (e.g. the
/// underlying namespace went away). Mirrors the kernel module's
/// `nvmet_sq_destroy`/fatal-error path.
#[derive(Debug, Clone)]
pub struct FatalError {
    pub reason: String,
}

/// The interface this transport consumes. A real implementation lives
/// outside this crate; tests exercise the transport against an
/// in-memory fake (`tests/fake_backend.rs`).
pub trait Backend: Send + Sync + 'static {
    /// Allocate backend-side state for a new queue. `sq_size` is the
    /// negotiated submission queue depth; the command-slot pool this
    /// crate allocates is sized `2 * sq_size` (matching the original
    /// source's `install_queue` contract) so that in-flight r2t/read
    /// bookkeeping never contends with new submissions.
    fn submit_queue_init(&self, qid: u16, sq_size: u16) -> Result<()>;

    /// Register the channel the backend pushes completions through for
    /// this queue, and return the command-slot pool size to allocate
    /// (`2 * sq_size` per the contract above).
    fn install_queue(&self, qid: u16, sq_size: u16, responses: mpsc::Sender<Completion>) -> u16;

    /// Hand a freshly parsed command (plus any in-capsule data already
    /// received) to the backend.
    fn submit(&self, qid: u16, sqe: &[u8; 64], inline_data: Option<Bytes>) -> Result<SubmitOutcome>;

    /// Deliver write data collected via h2c_data once the full transfer
    /// has arrived (mirrors the kernel module's `nvmet_req_execute`
    /// call after the r2t data phase completes).
    fn complete_local(&self, qid: u16, handle: SubmissionHandle, data: Bytes) -> Result<()>;

    /// Tear down backend-side state for a queue. Called exactly once,
    /// after the transport has already stopped submitting to it.
    fn uninit(&self, qid: u16);

    /// Reported by the backend when it wants the queue torn down
    /// regardless of transport-level health (e.g. namespace removed).
    fn fatal_error(&self, qid: u16, err: FatalError);
}

impl<T: Backend + ?Sized> Backend for Arc<T> {
    fn submit_queue_init(&self, qid: u16, sq_size: u16) -> Result<()> {
        (**self).submit_queue_init(qid, sq_size)
    }

    fn install_queue(&self, qid: u16, sq_size: u16, responses: mpsc::Sender<Completion>) -> u16 {
        (**self).install_queue(qid, sq_size, responses)
    }

    fn submit(&self, qid: u16, sqe: &[u8; 64], inline_data: Option<Bytes>) -> Result<SubmitOutcome> {
        (**self).submit(qid, sqe, inline_data)
    }

    fn complete_local(&self, qid: u16, handle: SubmissionHandle, data: Bytes) -> Result<()> {
        (**self).complete_local(qid, handle, data)
    }

    fn uninit(&self, qid: u16) {
        (**self).uninit(qid)
    }

    fn fatal_error(&self, qid: u16, err: FatalError) {
        (**self).fatal_error(qid, err)
    }
}
