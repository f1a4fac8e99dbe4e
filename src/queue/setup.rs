// SPDX-License-Identifier: AGPL-3.0-or-later

//! Connection setup: the first PDU on every new queue must be an
//! `icreq`, answered with exactly one `icresp` before the queue moves
//! to `Live`. Short and linear enough that it is expressed with
//! [`StateMachineCtx`] rather than the budget-bound worker loop the
//! rest of a queue's life runs under.

use anyhow::{Context, Result, bail, ensure};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zerocopy::IntoBytes;

use crate::{
    cfg::enums::DigestPolicy,
    pdu::{
        common::{GENERIC_HEADER_LEN, GenericHeader, PduType},
        icreq::{ICREQ_LEN, IcReq},
        icresp::IcResp,
    },
    queue::Queue,
    state_machine::common::StateMachineCtx,
};

/// Negotiated digest settings, reported back to the caller so it can
/// flip `Queue::hdr_digest`/`Queue::data_digest` before entering the
/// receive/send pipelines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NegotiatedDigests {
    pub hdr_digest: bool,
    pub data_digest: bool,
}

/// Borrows a queue's socket halves just long enough to run the
/// handshake; the state lives entirely on the stack, there's nothing
/// worth persisting across calls the way there is for a queue's
/// continuous pipelines.
pub struct ConnSetup<'a, R, W> {
    reader: &'a mut R,
    writer: &'a mut W,
    hdr_digest_policy: DigestPolicy,
    data_digest_policy: DigestPolicy,
}

impl<'a, R, W> ConnSetup<'a, R, W> {
    pub fn new(
        reader: &'a mut R,
        writer: &'a mut W,
        hdr_digest_policy: DigestPolicy,
        data_digest_policy: DigestPolicy,
    ) -> Self {
        ConnSetup { reader, writer, hdr_digest_policy, data_digest_policy }
    }
}

impl<R, W> StateMachineCtx<(), NegotiatedDigests> for ConnSetup<'_, R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn execute(&mut self) -> Result<NegotiatedDigests> {
        let mut raw = [0u8; GENERIC_HEADER_LEN];
        self.reader
            .read_exact(&mut raw)
            .await
            .context("reading icreq generic header")?;
        let (hdr, ty) = GenericHeader::parse(&raw)?;
        ensure!(ty == PduType::IcReq, "first PDU on a new queue must be icreq, got {ty:?}");
        ensure!(hdr.plen() == ICREQ_LEN, "icreq: plen must be {ICREQ_LEN}");

        let mut rest = vec![0u8; ICREQ_LEN - GENERIC_HEADER_LEN];
        self.reader.read_exact(&mut rest).await.context("reading icreq body")?;
        let mut full = Vec::with_capacity(ICREQ_LEN);
        full.extend_from_slice(&raw);
        full.extend_from_slice(&rest);

        let icreq = IcReq::parse(&full)?;
        let digests =
            NegotiatedDigests { hdr_digest: icreq.wants_header_digest(), data_digest: icreq.wants_data_digest() };

        if self.hdr_digest_policy == DigestPolicy::Required && !digests.hdr_digest {
            bail!("host declined header digest but target policy requires it");
        }
        if self.data_digest_policy == DigestPolicy::Required && !digests.data_digest {
            bail!("host declined data digest but target policy requires it");
        }

        let icresp = IcResp::new(digests.hdr_digest, digests.data_digest);
        self.writer.write_all(icresp.as_bytes()).await.context("writing icresp")?;
        self.writer.flush().await?;

        Ok(digests)
    }
}

impl<R, W> Queue<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Runs the icreq/icresp exchange and, on success, applies the
    /// negotiated digest settings and marks the queue `Live`. Rejects
    /// (and tears down) a connection that declines a digest the target
    /// is configured to require.
    pub async fn run_setup(&mut self, hdr_digest_policy: DigestPolicy, data_digest_policy: DigestPolicy) -> Result<()> {
        let digests = {
            let mut setup = ConnSetup::new(&mut self.reader, &mut self.writer, hdr_digest_policy, data_digest_policy);
            setup.execute().await?
        };
        self.hdr_digest = digests.hdr_digest;
        self.data_digest = digests.data_digest;
        self.mark_live().await;
        Ok(())
    }
}
