// SPDX-License-Identifier: AGPL-3.0-or-later

//! A write with no in-capsule data at all: the target must solicit the
//! full transfer with one r2t (this transport never splits a transfer
//! across more than one, `maxr2t = 0`), then complete once the
//! matching h2c_data lands.

use tokio::io::AsyncWriteExt;

use super::common::{self, OPCODE_WRITE};

const TRANSFER_LEN: u32 = 64 * 1024;

#[tokio::test]
async fn non_inline_write_round_trips_through_r2t() {
    let mut target = common::spawn_target(256 * 1024).await;
    common::handshake(&mut target.host_io, false, false).await;

    let cid = 11u16;
    let cmd = common::encode_cmd(cid, OPCODE_WRITE, 4096, TRANSFER_LEN, &[], false, false);
    target.host_io.write_all(&cmd).await.expect("write cmd");

    let r2t = common::read_r2t(&mut target.host_io).await;
    assert_eq!(r2t.cccid, cid);
    assert_eq!(r2t.r2t_offset, 0);
    assert_eq!(r2t.r2t_length, TRANSFER_LEN);

    let payload: Vec<u8> = (0..TRANSFER_LEN).map(|b| ((b * 3) % 256) as u8).collect();
    let h2c = common::encode_h2c_data(cid, r2t.ttag, 0, &payload, true, false, false);
    target.host_io.write_all(&h2c).await.expect("write h2c_data");

    let cqe = common::read_rsp(&mut target.host_io).await;
    assert_eq!(common::cqe_cid(&cqe), cid);
    assert_eq!(target.backend.disk_snapshot(4096, TRANSFER_LEN as usize), payload);
}
