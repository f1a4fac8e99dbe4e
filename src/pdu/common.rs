// SPDX-License-Identifier: AGPL-3.0-or-later

//! Generic NVMe/TCP PDU header (common.name: `pdu_hdr` upstream) and the
//! small set of traits every concrete PDU type implements on top of it.
//!
//! Every NVMe/TCP PDU starts with the same 8-byte header:
//!
//! ```text
//!  0        1        2        3        4            8
//! +--------+--------+--------+--------+--------------+
//! |  type  | flags  |  hlen  |  pdo   |     plen      |
//! +--------+--------+--------+--------+--------------+
//! ```
//!
//! `hlen` is the length of the header section (generic header +
//! type-specific header, no data), `pdo` ("PDU Data Offset") is the
//! offset of the data section from the start of the PDU, and `plen` is
//! the total PDU length including any data and digests.

use anyhow::{Result, bail};
use bitflags::bitflags;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, U32};

/// Length of the generic PDU header common to every PDU type.
pub const GENERIC_HEADER_LEN: usize = 8;

bitflags! {
    /// Per-PDU flag byte. `HDGST`/`DDGST` are common to every PDU type;
    /// `LAST_PDU`/`SUCCESS` only apply to h2c_data/c2h_data.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct PduFlags: u8 {
        /// Header digest follows the type-specific header.
        const HDGST    = 0b0000_0001;
        /// Data digest follows the data section.
        const DDGST    = 0b0000_0010;
        /// h2c_data/c2h_data: this is the last data PDU of the transfer.
        const LAST_PDU = 0b0000_0100;
        /// c2h_data only: target will not send a separate `rsp` PDU,
        /// this data PDU implies successful completion.
        const SUCCESS  = 0b0000_1000;
    }
}

/// Wire values for the PDU types this transport handles. Values match
/// the NVMe/TCP transport binding so a packet capture lines up with
/// these names directly.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    IcReq = 0x00,
    IcResp = 0x01,
    Cmd = 0x04,
    Rsp = 0x05,
    H2cData = 0x06,
    C2hData = 0x07,
    R2t = 0x09,
}

impl PduType {
    pub const fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => Self::IcReq,
            0x01 => Self::IcResp,
            0x04 => Self::Cmd,
            0x05 => Self::Rsp,
            0x06 => Self::H2cData,
            0x07 => Self::C2hData,
            0x09 => Self::R2t,
            _ => return None,
        })
    }
}

/// Byte-exact generic PDU header, shared prefix of every PDU on the
/// wire.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct GenericHeader {
    pub pdu_type: u8,
    pub flags: u8,
    pub hlen: u8,
    pub pdo: u8,
    pub plen: U32<LittleEndian>,
}

impl GenericHeader {
    pub fn parse(buf: &[u8; GENERIC_HEADER_LEN]) -> Result<(Self, PduType)> {
        let hdr = Self::read_from_bytes(buf.as_slice())
            .map_err(|e| anyhow::anyhow!("malformed generic header: {e}"))?;
        let Some(ty) = PduType::from_u8(hdr.pdu_type) else {
            bail!("unknown PDU type 0x{:02x}", hdr.pdu_type);
        };
        Ok((hdr, ty))
    }

    #[inline]
    pub fn flags(&self) -> PduFlags {
        PduFlags::from_bits_truncate(self.flags)
    }

    #[inline]
    pub fn set_flags(&mut self, flags: PduFlags) {
        self.flags = flags.bits();
    }

    #[inline]
    pub fn hlen(&self) -> usize {
        self.hlen as usize
    }

    #[inline]
    pub fn pdo(&self) -> usize {
        self.pdo as usize
    }

    #[inline]
    pub fn plen(&self) -> usize {
        self.plen.get() as usize
    }
}

/// Implemented by every concrete PDU's fixed-size header struct so the
/// receive/send pipelines can work generically across types that
/// otherwise have nothing in common.
pub trait PduHeaderView: Sized {
    /// Byte length of this PDU type's header, generic header included,
    /// digests excluded.
    const HEADER_LEN: usize;
    const TYPE: PduType;

    fn generic(&self) -> &GenericHeader;
    fn generic_mut(&mut self) -> &mut GenericHeader;
}
