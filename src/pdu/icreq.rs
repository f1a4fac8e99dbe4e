// SPDX-License-Identifier: AGPL-3.0-or-later

//! Initialize Connection Request (icreq), the mandatory first PDU of
//! every NVMe/TCP connection.

use anyhow::{Result, ensure};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, U16, U32};

use crate::pdu::common::{GenericHeader, PduHeaderView, PduType};

pub const ICREQ_LEN: usize = 128;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct IcReq {
    pub hdr: GenericHeader,
    pub pfv: U16<LittleEndian>,
    pub hpda: u8,
    /// bit0 = HeaderDigest supported, bit1 = DataDigest supported.
    pub digest: u8,
    pub maxr2t: U32<LittleEndian>,
    reserved: [u8; 112],
}

impl PduHeaderView for IcReq {
    const HEADER_LEN: usize = ICREQ_LEN;
    const TYPE: PduType = PduType::IcReq;

    fn generic(&self) -> &GenericHeader {
        &self.hdr
    }

    fn generic_mut(&mut self) -> &mut GenericHeader {
        &mut self.hdr
    }
}

impl IcReq {
    pub const DIGEST_HEADER: u8 = 0b01;
    pub const DIGEST_DATA: u8 = 0b10;

    pub fn parse(buf: &[u8]) -> Result<&Self> {
        let req = Self::ref_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("malformed icreq: {e}"))?;
        ensure!(req.hdr.plen() == ICREQ_LEN, "icreq: plen must equal {ICREQ_LEN}");
        ensure!(req.pfv.get() == 0, "icreq: unsupported pfv {}", req.pfv.get());
        ensure!(req.hpda == 0, "icreq: hpda must be 0, got {}", req.hpda);
        ensure!(req.maxr2t.get() == 0, "icreq: maxr2t must be 0, got {}", req.maxr2t.get());
        Ok(req)
    }

    pub fn wants_header_digest(&self) -> bool {
        self.digest & Self::DIGEST_HEADER != 0
    }

    pub fn wants_data_digest(&self) -> bool {
        self.digest & Self::DIGEST_DATA != 0
    }
}
