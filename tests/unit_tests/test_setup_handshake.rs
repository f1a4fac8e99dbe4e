// SPDX-License-Identifier: AGPL-3.0-or-later

//! Exercises `Queue::run_setup` directly over an in-memory duplex pipe,
//! without a backend — the handshake itself never touches one.

use i10_target_rs::{cfg::enums::DigestPolicy, queue::Queue};
use tokio::{
    io::{self, AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
};

const ICREQ_LEN: usize = 128;
const ICRESP_LEN: usize = 128;

fn encode_icreq(pfv: u16, hpda: u8, digest: u8, plen: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ICREQ_LEN);
    buf.push(0x00); // pdu_type: icreq
    buf.push(0); // flags
    buf.push(ICREQ_LEN as u8); // hlen
    buf.push(0); // pdo
    buf.extend_from_slice(&plen.to_le_bytes());
    buf.extend_from_slice(&pfv.to_le_bytes());
    buf.push(hpda);
    buf.push(digest);
    buf.extend_from_slice(&0u32.to_le_bytes()); // maxr2t
    buf.resize(ICREQ_LEN, 0);
    buf
}

fn new_queue_over_duplex() -> (Queue<io::ReadHalf<io::DuplexStream>, io::WriteHalf<io::DuplexStream>>, io::DuplexStream) {
    let (target_io, host_io) = io::duplex(4096);
    let (target_read, target_write) = io::split(target_io);
    let (_tx, rx) = mpsc::channel(1);
    (Queue::new(0, target_read, target_write, 8, 4096, rx), host_io)
}

#[tokio::test]
async fn negotiates_both_digests_and_marks_queue_live() {
    let (mut queue, mut host_io) = new_queue_over_duplex();

    let client = tokio::spawn(async move {
        host_io.write_all(&encode_icreq(0, 0, 0b11, ICREQ_LEN as u32)).await.expect("write icreq");
        let mut resp = vec![0u8; ICRESP_LEN];
        host_io.read_exact(&mut resp).await.expect("read icresp");
        resp
    });

    queue.run_setup(DigestPolicy::Offered, DigestPolicy::Offered).await.expect("setup should succeed");
    assert!(queue.hdr_digest);
    assert!(queue.data_digest);
    assert!(queue.is_live().await);

    let resp = client.await.expect("client task");
    assert_eq!(resp[0], 0x01, "icresp pdu type");
    assert_eq!(resp[11] & 0b11, 0b11, "icresp should mirror both digests");
}

#[tokio::test]
async fn rejects_nonzero_pfv() {
    let (mut queue, mut host_io) = new_queue_over_duplex();

    tokio::spawn(async move {
        let _ = host_io.write_all(&encode_icreq(1, 0, 0, ICREQ_LEN as u32)).await;
    });

    assert!(queue.run_setup(DigestPolicy::Offered, DigestPolicy::Offered).await.is_err());
}

#[tokio::test]
async fn rejects_wrong_plen() {
    let (mut queue, mut host_io) = new_queue_over_duplex();

    tokio::spawn(async move {
        let _ = host_io.write_all(&encode_icreq(0, 0, 0, 64)).await;
    });

    assert!(queue.run_setup(DigestPolicy::Offered, DigestPolicy::Offered).await.is_err());
}

#[tokio::test]
async fn rejects_digest_declined_when_policy_requires_it() {
    let (mut queue, mut host_io) = new_queue_over_duplex();

    tokio::spawn(async move {
        // host declines both digests.
        let _ = host_io.write_all(&encode_icreq(0, 0, 0b00, ICREQ_LEN as u32)).await;
    });

    assert!(queue.run_setup(DigestPolicy::Required, DigestPolicy::Offered).await.is_err());
}
