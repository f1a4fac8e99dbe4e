// SPDX-License-Identifier: AGPL-3.0-or-later

//! icreq/icresp handshake with digests declined, followed by one
//! no-data command to confirm the queue is actually live afterwards.

use tokio::io::AsyncWriteExt;

use super::common::{self, OPCODE_NONE};

#[tokio::test]
async fn negotiates_no_digests_and_answers_a_bare_command() {
    let mut target = common::spawn_target(4096).await;

    let negotiated = common::handshake(&mut target.host_io, false, false).await;
    assert!(!negotiated.hdr_digest);
    assert!(!negotiated.data_digest);

    let cmd = common::encode_cmd(0x42, OPCODE_NONE, 0, 0, &[], false, false);
    target.host_io.write_all(&cmd).await.expect("write cmd");

    let cqe = common::read_rsp(&mut target.host_io).await;
    assert_eq!(common::cqe_cid(&cqe), 0x42);

    assert!(target.registry.is_live(target.qid));
}
