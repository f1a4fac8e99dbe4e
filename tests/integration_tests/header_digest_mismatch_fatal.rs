// SPDX-License-Identifier: AGPL-3.0-or-later

//! A corrupted header digest is fatal: the queue worker tears the
//! connection down instead of trying to resynchronize on the wire.

use tokio::io::AsyncWriteExt;

use super::common::{self, OPCODE_NONE};

#[tokio::test]
async fn corrupt_header_digest_tears_down_the_queue() {
    let mut target = common::spawn_target(4096).await;
    let negotiated = common::handshake(&mut target.host_io, true, false).await;
    assert!(negotiated.hdr_digest);

    let mut cmd = common::encode_cmd(3, OPCODE_NONE, 0, 0, &[], true, false);
    let digest_pos = common::CMD_HEADER_LEN;
    cmd[digest_pos] ^= 0xff;
    target.host_io.write_all(&cmd).await.expect("write corrupt cmd");

    let outcome = target.worker.await.expect("worker task did not panic");
    assert!(outcome.is_err(), "a header digest mismatch must fail the queue worker");
    assert!(!target.registry.is_live(target.qid));
}
