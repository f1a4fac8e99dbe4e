// SPDX-License-Identifier: AGPL-3.0-or-later

//! A port: one bound TCP listener accepting NVMe/TCP connections and
//! spinning each one up into its own queue worker task. Socket options
//! follow the original source's `nvmet_tcp_add_port`: `SO_REUSEADDR`
//! always set, `SO_REUSEPORT` only when the port config opts in,
//! send/receive buffers forced to 8MiB so a caravan flush never blocks
//! on a small kernel socket buffer, and `TCP_NODELAY` set on every
//! accepted connection.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{net::TcpSocket, sync::mpsc};

use crate::{
    backend::Backend,
    cfg::{PortConfig, TargetConfig},
    queue::Queue,
    registry::Registry,
    worker,
};

const SOCKET_BUFFER_BYTES: u32 = 8 * 1024 * 1024;

pub struct Port {
    listener: tokio::net::TcpListener,
    config: PortConfig,
}

impl Port {
    pub fn bind(config: PortConfig) -> Result<Self> {
        let socket = match config.bind {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .context("creating listening socket")?;

        socket.set_reuseaddr(true)?;
        #[cfg(unix)]
        if config.reuse_port {
            socket.set_reuseport(true)?;
        }
        socket.set_send_buffer_size(SOCKET_BUFFER_BYTES)?;
        socket.set_recv_buffer_size(SOCKET_BUFFER_BYTES)?;

        socket.bind(config.bind).with_context(|| format!("binding {}", config.bind))?;
        let listener = socket.listen(config.backlog)?;
        Ok(Port { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the process shuts down, handing each
    /// one off to a fresh queue worker task. A new `qid` is allocated
    /// from `registry` right after the TCP accept, before the
    /// icreq/icresp handshake even starts, so teardown can always find
    /// and release it. `target`'s digest policy is enforced during that
    /// handshake, rejecting a host that declines a digest the target
    /// requires.
    pub async fn serve(self, registry: Registry, backend: Arc<dyn Backend>, target: &TargetConfig) -> Result<()> {
        let hdr_digest_policy = target.header_digest;
        let data_digest_policy = target.data_digest;
        let mut next_cpu = 0usize;
        loop {
            let (stream, peer) = self.listener.accept().await.context("accept")?;
            stream.set_nodelay(true)?;

            let cpu_hint = if self.config.cpu_set.is_empty() {
                None
            } else {
                let cpu = self.config.cpu_set[next_cpu % self.config.cpu_set.len()];
                next_cpu += 1;
                Some(cpu)
            };
            tracing::info!(%peer, ?cpu_hint, "accepted NVMe/TCP connection");

            let Some(qid) = registry.register().await else {
                tracing::warn!(%peer, "queue table full, dropping connection");
                continue;
            };

            let registry = registry.clone();
            let backend = backend.clone();
            let inline_data_size = self.config.inline_data_size;

            tokio::spawn(async move {
                if let Err(e) = backend.submit_queue_init(qid, admission_channel_depth() as u16) {
                    tracing::warn!(qid, "backend rejected new queue: {e}");
                    registry.remove(qid).await;
                    return;
                }

                let (read_half, write_half) = stream.into_split();
                let (tx, rx) = mpsc::channel(admission_channel_depth());
                let mut queue = Queue::new(qid, read_half, write_half, admission_channel_depth() as u16, inline_data_size, rx);

                if let Err(e) = queue.run_setup(hdr_digest_policy, data_digest_policy).await {
                    tracing::warn!(qid, "connection setup failed: {e}");
                    backend.uninit(qid);
                    registry.remove(qid).await;
                    return;
                }

                // `install_queue` reports the command-slot pool size to
                // actually use (`2 * sq_size`); the pool built above with
                // a placeholder capacity is empty at this point (no PDU
                // has been processed yet), so swapping it out is safe.
                let slot_capacity = backend.install_queue(qid, admission_channel_depth() as u16, tx);
                queue.pool = crate::queue::slot::SlotPool::new(slot_capacity);

                if let Err(e) = worker::run(queue, registry, backend).await {
                    tracing::warn!(qid, "queue worker error: {e}");
                }
            });
        }
    }
}

/// Slot-pool / completion-channel depth used before a backend has had
/// a chance to report its own negotiated submission queue depth.
fn admission_channel_depth() -> usize {
    128
}
