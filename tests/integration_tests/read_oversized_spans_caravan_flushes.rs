// SPDX-License-Identifier: AGPL-3.0-or-later

//! A read whose payload alone exceeds a caravan's byte capacity. Before
//! the per-page chunking fix this failed `caravan.push` on the single
//! oversized data segment and tore the connection down; the data still
//! goes out as one c2h_data PDU (the chunking is a send-side staging
//! detail, invisible on the wire), so the host should see it exactly
//! like any other read, just bigger.

use tokio::io::AsyncWriteExt;

use super::common::{self, OPCODE_READ};

const TRANSFER_LEN: u32 = 3 * 65536 + 4096;

#[tokio::test]
async fn oversized_read_does_not_tear_down_the_connection() {
    let mut target = common::spawn_target(512 * 1024).await;
    common::handshake(&mut target.host_io, false, false).await;

    let cid = 5u16;
    let cmd = common::encode_cmd(cid, OPCODE_READ, 0, TRANSFER_LEN, &[], false, false);
    target.host_io.write_all(&cmd).await.expect("write cmd");

    let data_pdu = common::read_c2h_data(&mut target.host_io, false).await;
    assert_eq!(data_pdu.cccid, cid);
    assert_eq!(data_pdu.data_offset, 0);
    assert_eq!(data_pdu.data_length, TRANSFER_LEN);
    assert!(data_pdu.last);
    assert_eq!(data_pdu.data, target.backend.disk_snapshot(0, TRANSFER_LEN as usize));

    let cqe = common::read_rsp(&mut target.host_io).await;
    assert_eq!(common::cqe_cid(&cqe), cid);
}
