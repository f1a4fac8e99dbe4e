// SPDX-License-Identifier: AGPL-3.0-or-later

//! Controller-to-Host Data (c2h_data): outbound read data. Carried
//! exclusively in the bulk caravan (never the control caravan — see
//! `queue::caravan`).

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, U16, U32};

use crate::pdu::common::{GenericHeader, PduFlags, PduHeaderView, PduType};

pub const C2H_DATA_HEADER_LEN: usize = 24;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct C2hDataHeader {
    pub hdr: GenericHeader,
    pub cccid: U16<LittleEndian>,
    reserved1: [u8; 2],
    pub data_offset: U32<LittleEndian>,
    pub data_length: U32<LittleEndian>,
    reserved2: [u8; 4],
}

impl PduHeaderView for C2hDataHeader {
    const HEADER_LEN: usize = C2H_DATA_HEADER_LEN;
    const TYPE: PduType = PduType::C2hData;

    fn generic(&self) -> &GenericHeader {
        &self.hdr
    }

    fn generic_mut(&mut self) -> &mut GenericHeader {
        &mut self.hdr
    }
}

impl C2hDataHeader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cccid: u16,
        data_offset: u32,
        data_length: u32,
        last: bool,
        success: bool,
        hdr_digest: bool,
        data_digest: bool,
    ) -> Self {
        let mut flags = PduFlags::empty();
        if last {
            flags |= PduFlags::LAST_PDU;
        }
        if success {
            flags |= PduFlags::SUCCESS;
        }
        if hdr_digest {
            flags |= PduFlags::HDGST;
        }
        if data_digest {
            flags |= PduFlags::DDGST;
        }
        let hdgst_len = if hdr_digest { 4 } else { 0 };
        let ddgst_len = if data_digest { 4 } else { 0 };
        let mut hdr = GenericHeader {
            pdu_type: PduType::C2hData as u8,
            hlen: C2H_DATA_HEADER_LEN as u8,
            pdo: (C2H_DATA_HEADER_LEN + hdgst_len) as u8,
            plen: U32::new((C2H_DATA_HEADER_LEN as u32) + hdgst_len as u32 + data_length + ddgst_len as u32),
            ..Default::default()
        };
        hdr.set_flags(flags);
        C2hDataHeader {
            hdr,
            cccid: U16::new(cccid),
            reserved1: [0; 2],
            data_offset: U32::new(data_offset),
            data_length: U32::new(data_length),
            reserved2: [0; 4],
        }
    }

    pub fn is_success(&self) -> bool {
        self.hdr.flags().contains(PduFlags::SUCCESS)
    }
}
