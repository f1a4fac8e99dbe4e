// SPDX-License-Identifier: AGPL-3.0-or-later

//! Capsule Command (cmd) PDU: a generic header followed by a 64-byte
//! NVMe submission queue entry. The entry's contents are opaque to the
//! transport — only the command identifier (`cid`, bytes 2..4) is read
//! here, to correlate a later completion with the slot that submitted
//! it. Everything else is handed to the backend untouched.

use anyhow::{Result, ensure};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::pdu::common::{GenericHeader, PduHeaderView, PduType};

pub const NVME_SQE_LEN: usize = 64;
pub const CMD_HEADER_LEN: usize = 8 + NVME_SQE_LEN;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct CmdPdu {
    pub hdr: GenericHeader,
    pub sqe: [u8; NVME_SQE_LEN],
}

impl Default for CmdPdu {
    fn default() -> Self {
        CmdPdu {
            hdr: GenericHeader::default(),
            sqe: [0; NVME_SQE_LEN],
        }
    }
}

impl PduHeaderView for CmdPdu {
    const HEADER_LEN: usize = CMD_HEADER_LEN;
    const TYPE: PduType = PduType::Cmd;

    fn generic(&self) -> &GenericHeader {
        &self.hdr
    }

    fn generic_mut(&mut self) -> &mut GenericHeader {
        &mut self.hdr
    }
}

impl CmdPdu {
    pub fn parse(buf: &[u8]) -> Result<&Self> {
        let pdu = Self::ref_from_bytes(buf).map_err(|e| anyhow::anyhow!("malformed cmd pdu: {e}"))?;
        ensure!(pdu.hdr.hlen() == CMD_HEADER_LEN, "cmd: hlen must be {CMD_HEADER_LEN}");
        Ok(pdu)
    }

    /// NVMe command identifier, bytes 2..4 of the submission queue
    /// entry. Distinct from the transport-level `ttag` (slot index).
    pub fn cid(&self) -> u16 {
        u16::from_le_bytes([self.sqe[2], self.sqe[3]])
    }

    /// NVMe opcode, byte 0 of the submission queue entry. The read/write
    /// split (bit 0 of the upper opcode nibble convention) is a backend
    /// concern; the transport only needs to know whether to expect
    /// inbound write data, which the backend reports back via the
    /// submission result, not by opcode inspection here.
    pub fn opcode(&self) -> u8 {
        self.sqe[0]
    }
}
