// SPDX-License-Identifier: AGPL-3.0-or-later

//! CRC32C header/data digest helpers shared by the receive and send
//! pipelines.
//!
//! NVMe/TCP digests cover exactly one PDU each (unlike a streaming
//! checksum): the header digest covers the 8-byte generic header plus
//! any PDU-specific header extension, and the data digest covers the
//! payload alone. Both are plain CRC32C with no padding rules (NVMe/TCP
//! PDUs are already a multiple of 4 bytes via `pdo`/`plen`), so this
//! module is a thin wrapper over [`crc32c::crc32c_append`].

use crc32c::crc32c_append;

/// Computes the CRC32C digest of a single contiguous header buffer.
#[inline]
pub fn header_digest(header: &[u8]) -> u32 {
    crc32c_append(0, header)
}

/// Computes the CRC32C digest of a PDU's data payload, which may be
/// delivered as several scattered chunks (e.g. across multiple `recv`
/// calls into a mapped SGL).
#[inline]
pub fn data_digest_of_parts(parts: &[&[u8]]) -> u32 {
    let mut acc = 0u32;
    for part in parts {
        if !part.is_empty() {
            acc = crc32c_append(acc, part);
        }
    }
    acc
}

/// Computes the CRC32C digest of one contiguous data payload.
#[inline]
pub fn data_digest(data: &[u8]) -> u32 {
    crc32c_append(0, data)
}
