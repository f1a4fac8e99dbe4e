// SPDX-License-Identifier: AGPL-3.0-or-later

//! A write whose data arrives entirely in-capsule: no r2t is needed,
//! the backend sees the whole payload as `inline_data` on `submit` and
//! completes immediately.

use tokio::io::AsyncWriteExt;

use super::common::{self, OPCODE_WRITE};

#[tokio::test]
async fn inline_write_completes_without_r2t() {
    let mut target = common::spawn_target(64 * 1024).await;
    common::handshake(&mut target.host_io, false, false).await;

    let cid = 9u16;
    let payload: Vec<u8> = (0..1024u32).map(|b| (b % 256) as u8).collect();
    let cmd = common::encode_cmd(cid, OPCODE_WRITE, 2048, 1024, &payload, false, false);
    target.host_io.write_all(&cmd).await.expect("write cmd");

    let cqe = common::read_rsp(&mut target.host_io).await;
    assert_eq!(common::cqe_cid(&cqe), cid);
    assert_eq!(target.backend.disk_snapshot(2048, 1024), payload);
}
