// SPDX-License-Identifier: AGPL-3.0-or-later

//! A single 4KiB read: one c2h_data PDU carrying the whole payload
//! (`last` set, `success` always false on this transport) followed by
//! the closing `rsp`.

use tokio::io::AsyncWriteExt;

use super::common::{self, OPCODE_READ};

#[tokio::test]
async fn reads_4kib_in_one_data_pdu() {
    let mut target = common::spawn_target(64 * 1024).await;
    common::handshake(&mut target.host_io, false, false).await;

    let cid = 7u16;
    let cmd = common::encode_cmd(cid, OPCODE_READ, 0, 4096, &[], false, false);
    target.host_io.write_all(&cmd).await.expect("write cmd");

    let data_pdu = common::read_c2h_data(&mut target.host_io, false).await;
    assert_eq!(data_pdu.cccid, cid);
    assert_eq!(data_pdu.data_offset, 0);
    assert_eq!(data_pdu.data_length, 4096);
    assert!(data_pdu.last);
    assert!(!data_pdu.success);
    assert_eq!(data_pdu.data, target.backend.disk_snapshot(0, 4096));

    let cqe = common::read_rsp(&mut target.host_io).await;
    assert_eq!(common::cqe_cid(&cqe), cid);
}
