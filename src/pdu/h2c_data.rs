// SPDX-License-Identifier: AGPL-3.0-or-later

//! Host-to-Controller Data (h2c_data): inbound write data, solicited by
//! an r2t or sent unsolicited as in-capsule-adjacent data.

use anyhow::{Result, ensure};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, U16, U32};

use crate::pdu::common::{GenericHeader, PduFlags, PduHeaderView, PduType};

pub const H2C_DATA_HEADER_LEN: usize = 24;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct H2cDataHeader {
    pub hdr: GenericHeader,
    pub cccid: U16<LittleEndian>,
    pub ttag: U16<LittleEndian>,
    pub data_offset: U32<LittleEndian>,
    pub data_length: U32<LittleEndian>,
    reserved: [u8; 4],
}

impl PduHeaderView for H2cDataHeader {
    const HEADER_LEN: usize = H2C_DATA_HEADER_LEN;
    const TYPE: PduType = PduType::H2cData;

    fn generic(&self) -> &GenericHeader {
        &self.hdr
    }

    fn generic_mut(&mut self) -> &mut GenericHeader {
        &mut self.hdr
    }
}

impl H2cDataHeader {
    pub fn parse(buf: &[u8]) -> Result<&Self> {
        let h = Self::ref_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("malformed h2c_data header: {e}"))?;
        ensure!(
            h.hdr.hlen() == H2C_DATA_HEADER_LEN,
            "h2c_data: hlen must be {H2C_DATA_HEADER_LEN}"
        );
        Ok(h)
    }

    pub fn is_last(&self) -> bool {
        self.hdr.flags().contains(PduFlags::LAST_PDU)
    }

    pub fn ttag(&self) -> u16 {
        self.ttag.get()
    }

    pub fn data_offset(&self) -> u32 {
        self.data_offset.get()
    }

    pub fn data_length(&self) -> u32 {
        self.data_length.get()
    }
}
