// SPDX-License-Identifier: AGPL-3.0-or-later

//! Capsule Response (rsp): the terminal PDU of every command that does
//! not complete implicitly via a `SUCCESS`-flagged c2h_data PDU. Carries
//! the 16-byte NVMe completion queue entry verbatim.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::pdu::common::{GenericHeader, PduFlags, PduHeaderView, PduType};

pub const NVME_CQE_LEN: usize = 16;
pub const RSP_HEADER_LEN: usize = 8 + NVME_CQE_LEN;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RspPdu {
    pub hdr: GenericHeader,
    pub cqe: [u8; NVME_CQE_LEN],
}

impl Default for RspPdu {
    fn default() -> Self {
        RspPdu {
            hdr: GenericHeader::default(),
            cqe: [0; NVME_CQE_LEN],
        }
    }
}

impl PduHeaderView for RspPdu {
    const HEADER_LEN: usize = RSP_HEADER_LEN;
    const TYPE: PduType = PduType::Rsp;

    fn generic(&self) -> &GenericHeader {
        &self.hdr
    }

    fn generic_mut(&mut self) -> &mut GenericHeader {
        &mut self.hdr
    }
}

impl RspPdu {
    pub fn new(cqe: [u8; NVME_CQE_LEN], hdr_digest: bool) -> Self {
        let hdgst_len = if hdr_digest { 4 } else { 0 };
        let mut hdr = GenericHeader {
            pdu_type: PduType::Rsp as u8,
            hlen: RSP_HEADER_LEN as u8,
            pdo: 0,
            plen: zerocopy::U32::new(RSP_HEADER_LEN as u32 + hdgst_len as u32),
            ..Default::default()
        };
        if hdr_digest {
            hdr.set_flags(PduFlags::HDGST);
        }
        RspPdu { hdr, cqe }
    }

    /// NVMe command identifier, bytes 12..14 of the completion queue
    /// entry (the standard CQE layout: DW0/DW1 result, SQHD/SQID,
    /// CID, status).
    pub fn cid(&self) -> u16 {
        u16::from_le_bytes([self.cqe[12], self.cqe[13]])
    }
}
