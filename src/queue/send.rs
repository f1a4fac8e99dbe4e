// SPDX-License-Identifier: AGPL-3.0-or-later

//! Send pipeline: walks `Queue::send_list`, advances each slot through
//! its `SendState` progression, and stages the resulting wire segments
//! into whichever caravan `classify` picks — then flushes both
//! caravans with one `write_all` sequence each once the pass ends.
//!
//! The admin queue (`qid == 0`) bypasses caravanning entirely: login
//! and keep-alive traffic is latency-sensitive and low-volume, so
//! batching it behind bulk I/O traffic would only add delay for no
//! throughput benefit.

use anyhow::Result;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use zerocopy::IntoBytes;

use crate::{
    digest,
    pdu::{c2h_data::C2hDataHeader, common::PduType, r2t::R2tHeader, rsp::RspPdu},
    queue::{
        Queue,
        caravan::{CaravanKind, SEND_BUDGET, classify},
        slot::SendState,
    },
};

const PAGE_SIZE: usize = 4096;

enum Staged {
    Direct(Bytes),
    /// `terminal` marks the one segment per command that finishes it,
    /// so `send_pass` knows to free `ttag` right after this exact push
    /// lands — never before, since an earlier segment's forced flush
    /// must not free a slot whose own segment hasn't been pushed yet.
    Caravan { kind: CaravanKind, segment: Bytes, ttag: u16, pages: usize, terminal: bool },
}

impl<R, W> Queue<R, W>
where W: AsyncWrite + Unpin
{
    /// Advances up to [`SEND_BUDGET`] slots and flushes whatever ended
    /// up staged. Returns the number of slots advanced.
    pub async fn send_pass(&mut self) -> Result<usize> {
        let mut advanced = 0usize;
        let mut staged = Vec::new();
        while advanced < SEND_BUDGET {
            let Some(ttag) = self.send_list.pop_front() else { break };
            self.advance_slot(ttag, &mut staged);
            advanced += 1;
        }

        for s in staged {
            match s {
                Staged::Direct(segment) => self.writer.write_all(&segment).await?,
                Staged::Caravan { kind, segment, ttag, pages, terminal } => {
                    let caravan = match kind {
                        CaravanKind::Large => &mut self.caravan_large,
                        CaravanKind::Small => &mut self.caravan_small,
                    };
                    if caravan.push(segment.clone(), Some(ttag), pages).is_err() {
                        self.flush_caravan(kind).await?;
                        let caravan = match kind {
                            CaravanKind::Large => &mut self.caravan_large,
                            CaravanKind::Small => &mut self.caravan_small,
                        };
                        caravan.push(segment, Some(ttag), pages).map_err(|_| {
                            anyhow::anyhow!("single PDU exceeds caravan capacity")
                        })?;
                    }
                    if terminal {
                        match kind {
                            CaravanKind::Large => self.free_after_large.push(ttag),
                            CaravanKind::Small => self.free_after_small.push(ttag),
                        }
                    }
                },
            }
        }
        self.flush_caravan(CaravanKind::Large).await?;
        self.flush_caravan(CaravanKind::Small).await?;
        Ok(advanced)
    }

    fn advance_slot(&mut self, ttag: u16, staged: &mut Vec<Staged>) {
        let is_admin = self.qid == 0;
        let Some(slot) = self.pool.get_mut(ttag) else { return };
        match slot.send_state {
            SendState::SendDataPdu => {
                let data = slot.read_buf.clone().unwrap_or_default();
                let last = slot.wbytes_done as usize + data.len() >= slot.transfer_len as usize;
                // `success` always false: a separate rsp always follows.
                let hdr = C2hDataHeader::new(
                    slot.cid,
                    slot.wbytes_done,
                    data.len() as u32,
                    last,
                    false,
                    self.hdr_digest,
                    self.data_digest,
                );
                slot.wbytes_done += data.len() as u32;

                let mut header_bytes = BytesMut::with_capacity(24 + 4);
                header_bytes.extend_from_slice(hdr.as_bytes());
                if self.hdr_digest {
                    header_bytes.extend_from_slice(&digest::header_digest(hdr.as_bytes()).to_le_bytes());
                }

                // One caravan segment per mapped page, so a read whose
                // payload alone exceeds a caravan's capacity still
                // flushes in pieces instead of failing a single
                // oversized push. The data digest trails as its own
                // segment rather than riding inside the last page's
                // bytes, since it covers the whole payload and isn't
                // known to belong to any one page.
                let mut segments: Vec<(Bytes, usize)> = Vec::new();
                if data.is_empty() {
                    segments.push((header_bytes.freeze(), 0));
                } else {
                    for (i, chunk) in data.chunks(PAGE_SIZE).enumerate() {
                        let mut seg = BytesMut::with_capacity(if i == 0 { header_bytes.len() } else { 0 } + chunk.len());
                        if i == 0 {
                            seg.extend_from_slice(&header_bytes);
                        }
                        seg.extend_from_slice(chunk);
                        segments.push((seg.freeze(), 1));
                    }
                }
                if self.data_digest {
                    segments.push((Bytes::copy_from_slice(&digest::data_digest(&data).to_le_bytes()), 0));
                }
                let last_idx = segments.len() - 1;

                if last {
                    slot.send_state = SendState::SendResponse;
                    self.send_list.push_back(ttag);
                } else {
                    slot.send_state = SendState::Done;
                }

                if is_admin {
                    for (segment, _) in segments {
                        staged.push(Staged::Direct(segment));
                    }
                    if !last {
                        self.pool.free(ttag);
                    }
                } else {
                    for (idx, (segment, pages)) in segments.into_iter().enumerate() {
                        let terminal = !last && idx == last_idx;
                        staged.push(Staged::Caravan { kind: CaravanKind::Large, segment, ttag, pages, terminal });
                    }
                }
            },
            SendState::SendR2t => {
                let hdr = R2tHeader::new(slot.cid, ttag, slot.rbytes_done, slot.rbytes_remaining(), self.hdr_digest);
                let mut segment = BytesMut::with_capacity(24 + 4);
                segment.extend_from_slice(hdr.as_bytes());
                if self.hdr_digest {
                    segment.extend_from_slice(&digest::header_digest(hdr.as_bytes()).to_le_bytes());
                }
                let segment = segment.freeze();
                slot.send_state = SendState::AwaitingHostData;
                if is_admin {
                    staged.push(Staged::Direct(segment));
                } else {
                    staged.push(Staged::Caravan { kind: CaravanKind::Small, segment, ttag, pages: 0, terminal: false });
                }
            },
            SendState::SendResponse => {
                let rsp = RspPdu::new(slot.cqe, self.hdr_digest);
                let is_read_completion = slot.wbytes_done > 0;
                let mut segment = BytesMut::with_capacity(24 + 4);
                segment.extend_from_slice(rsp.as_bytes());
                if self.hdr_digest {
                    segment.extend_from_slice(&digest::header_digest(rsp.as_bytes()).to_le_bytes());
                }
                let segment = segment.freeze();
                slot.send_state = SendState::Done;
                if is_admin {
                    self.pool.free(ttag);
                    staged.push(Staged::Direct(segment));
                } else {
                    let kind = classify(PduType::Rsp, is_read_completion);
                    staged.push(Staged::Caravan { kind, segment, ttag, pages: 0, terminal: true });
                }
            },
            SendState::Pending | SendState::AwaitingHostData | SendState::AwaitingCompletion | SendState::Done => {},
        }
    }

    async fn flush_caravan(&mut self, kind: CaravanKind) -> Result<()> {
        let caravan = match kind {
            CaravanKind::Large => &mut self.caravan_large,
            CaravanKind::Small => &mut self.caravan_small,
        };
        if caravan.is_empty() {
            return Ok(());
        }
        let segments: Vec<Bytes> = caravan.segments().to_vec();
        for segment in &segments {
            self.writer.write_all(segment).await?;
        }
        self.writer.flush().await?;
        let caravan = match kind {
            CaravanKind::Large => &mut self.caravan_large,
            CaravanKind::Small => &mut self.caravan_small,
        };
        caravan.take();
        let pending = match kind {
            CaravanKind::Large => std::mem::take(&mut self.free_after_large),
            CaravanKind::Small => std::mem::take(&mut self.free_after_small),
        };
        for ttag in pending {
            self.pool.free(ttag);
        }
        Ok(())
    }
}
