// SPDX-License-Identifier: AGPL-3.0-or-later

//! Initialize Connection Response (icresp), sent exactly once per live
//! connection in reply to icreq.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, U16, U32};

use crate::pdu::common::{GenericHeader, PduHeaderView, PduType};

pub const ICRESP_LEN: usize = 128;

/// Fixed per spec/Non-goals: this transport negotiates nothing beyond
/// digest support.
pub const MAXDATA: u32 = 0xffff;
pub const CPDA: u8 = 0;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct IcResp {
    pub hdr: GenericHeader,
    pub pfv: U16<LittleEndian>,
    pub cpda: u8,
    pub digest: u8,
    pub maxdata: U32<LittleEndian>,
    reserved: [u8; 112],
}

impl PduHeaderView for IcResp {
    const HEADER_LEN: usize = ICRESP_LEN;
    const TYPE: PduType = PduType::IcResp;

    fn generic(&self) -> &GenericHeader {
        &self.hdr
    }

    fn generic_mut(&mut self) -> &mut GenericHeader {
        &mut self.hdr
    }
}

impl IcResp {
    pub fn new(header_digest: bool, data_digest: bool) -> Self {
        let mut digest = 0u8;
        if header_digest {
            digest |= 0b01;
        }
        if data_digest {
            digest |= 0b10;
        }
        IcResp {
            hdr: GenericHeader {
                pdu_type: PduType::IcResp as u8,
                hlen: ICRESP_LEN as u8,
                pdo: 0,
                plen: U32::new(ICRESP_LEN as u32),
                ..Default::default()
            },
            pfv: U16::new(0),
            cpda: CPDA,
            digest,
            maxdata: U32::new(MAXDATA),
            reserved: [0; 112],
        }
    }
}
