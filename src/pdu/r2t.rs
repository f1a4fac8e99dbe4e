// SPDX-License-Identifier: AGPL-3.0-or-later

//! Ready To Transfer (r2t): solicits write data for a command that did
//! not carry it all in-capsule. This transport never issues more than
//! one outstanding r2t per command (`maxr2t = 0`, see icreq/icresp), so
//! there is exactly one r2t per non-inline write, covering the whole
//! remaining transfer.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, U16, U32};

use crate::pdu::common::{GenericHeader, PduFlags, PduHeaderView, PduType};

pub const R2T_HEADER_LEN: usize = 24;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct R2tHeader {
    pub hdr: GenericHeader,
    pub cccid: U16<LittleEndian>,
    pub ttag: U16<LittleEndian>,
    pub r2t_offset: U32<LittleEndian>,
    pub r2t_length: U32<LittleEndian>,
    reserved: [u8; 4],
}

impl PduHeaderView for R2tHeader {
    const HEADER_LEN: usize = R2T_HEADER_LEN;
    const TYPE: PduType = PduType::R2t;

    fn generic(&self) -> &GenericHeader {
        &self.hdr
    }

    fn generic_mut(&mut self) -> &mut GenericHeader {
        &mut self.hdr
    }
}

impl R2tHeader {
    pub fn new(cccid: u16, ttag: u16, r2t_offset: u32, r2t_length: u32, hdr_digest: bool) -> Self {
        let hdgst_len = if hdr_digest { 4 } else { 0 };
        let mut hdr = GenericHeader {
            pdu_type: PduType::R2t as u8,
            hlen: R2T_HEADER_LEN as u8,
            pdo: 0,
            plen: U32::new(R2T_HEADER_LEN as u32 + hdgst_len as u32),
            ..Default::default()
        };
        if hdr_digest {
            hdr.set_flags(PduFlags::HDGST);
        }
        R2tHeader {
            hdr,
            cccid: U16::new(cccid),
            ttag: U16::new(ttag),
            r2t_offset: U32::new(r2t_offset),
            r2t_length: U32::new(r2t_length),
            reserved: [0; 4],
        }
    }
}
