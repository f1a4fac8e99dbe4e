// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared harness for the integration tests: spins up one [`Queue`]
//! worker over an in-memory duplex pipe against a [`FakeBackend`], the
//! same wiring `Port::serve` does against a real `TcpStream`, and
//! exposes raw wire-encode/decode helpers so tests drive the target
//! exactly the way a real host would.

use std::sync::Arc;

use i10_target_rs::{backend::Backend, cfg::enums::DigestPolicy, queue::Queue, registry::Registry, worker};
use tokio::{
    io::{self, AsyncReadExt, AsyncWriteExt, DuplexStream},
    sync::mpsc,
    task::JoinHandle,
};

use crate::fake_backend::FakeBackend;

pub const DUPLEX_BUF: usize = 1 << 20;
pub const SLOT_CAPACITY: u16 = 32;
pub const INLINE_DATA_SIZE: u32 = 4096;

pub const GENERIC_HEADER_LEN: usize = 8;
pub const ICREQ_LEN: usize = 128;
pub const ICRESP_LEN: usize = 128;
pub const CMD_HEADER_LEN: usize = 72;
pub const H2C_DATA_HEADER_LEN: usize = 24;
pub const C2H_DATA_HEADER_LEN: usize = 24;
pub const R2T_HEADER_LEN: usize = 24;
pub const RSP_HEADER_LEN: usize = 24;

pub const PDU_ICRESP: u8 = 0x01;
pub const PDU_CMD: u8 = 0x04;
pub const PDU_RSP: u8 = 0x05;
pub const PDU_H2C_DATA: u8 = 0x06;
pub const PDU_C2H_DATA: u8 = 0x07;
pub const PDU_R2T: u8 = 0x09;

pub const FLAG_HDGST: u8 = 0b0000_0001;
pub const FLAG_DDGST: u8 = 0b0000_0010;
pub const FLAG_LAST_PDU: u8 = 0b0000_0100;
pub const FLAG_SUCCESS: u8 = 0b0000_1000;

pub const OPCODE_NONE: u8 = 0;
pub const OPCODE_WRITE: u8 = 1;
pub const OPCODE_READ: u8 = 2;

pub struct TestTarget {
    pub host_io: DuplexStream,
    pub backend: Arc<FakeBackend>,
    pub registry: Registry,
    pub qid: u16,
    pub worker: JoinHandle<anyhow::Result<()>>,
}

/// Brings up one queue the way `Port::serve` does: `submit_queue_init`,
/// construct the queue over the target side of a duplex pipe, run the
/// icreq/icresp handshake, `install_queue`, then hand off to the
/// cooperative worker loop in a background task. Returns the host side
/// of the pipe for the test to drive directly.
pub async fn spawn_target(disk_size: usize) -> TestTarget {
    let backend = Arc::new(FakeBackend::new(disk_size));
    let registry = Registry::new(8);

    // qid 0 is reserved for the admin queue on a real target and never
    // caravanned; burn it here so the I/O queue under test gets a
    // nonzero qid and actually exercises the caravan path.
    let admin_qid = registry.register().await.expect("queue table full");
    debug_assert_eq!(admin_qid, 0);

    let qid = registry.register().await.expect("queue table full");
    backend.submit_queue_init(qid, SLOT_CAPACITY).expect("submit_queue_init rejected");

    let (target_io, host_io) = io::duplex(DUPLEX_BUF);
    let (tx, rx) = mpsc::channel(128);

    let registry_task = registry.clone();
    let backend_task = backend.clone();
    let worker = tokio::spawn(async move {
        let (target_read, target_write) = io::split(target_io);
        let mut queue = Queue::new(qid, target_read, target_write, SLOT_CAPACITY, INLINE_DATA_SIZE, rx);
        queue.run_setup(DigestPolicy::Offered, DigestPolicy::Offered).await?;
        let pool_size = backend_task.install_queue(qid, SLOT_CAPACITY, tx);
        queue.pool = i10_target_rs::queue::slot::SlotPool::new(pool_size);
        worker::run(queue, registry_task, backend_task).await
    });

    TestTarget { host_io, backend, registry, qid, worker }
}

fn push_generic_header(buf: &mut Vec<u8>, pdu_type: u8, flags: u8, hlen: u8, pdo: u8, plen: u32) {
    buf.push(pdu_type);
    buf.push(flags);
    buf.push(hlen);
    buf.push(pdo);
    buf.extend_from_slice(&plen.to_le_bytes());
}

pub fn encode_icreq(hdr_digest: bool, data_digest: bool) -> Vec<u8> {
    let mut digest = 0u8;
    if hdr_digest {
        digest |= 0b01;
    }
    if data_digest {
        digest |= 0b10;
    }
    let mut buf = Vec::with_capacity(ICREQ_LEN);
    push_generic_header(&mut buf, 0x00, 0, ICREQ_LEN as u8, 0, ICREQ_LEN as u32);
    buf.extend_from_slice(&0u16.to_le_bytes()); // pfv
    buf.push(0); // hpda
    buf.push(digest);
    buf.extend_from_slice(&0u32.to_le_bytes()); // maxr2t
    buf.resize(ICREQ_LEN, 0);
    buf
}

pub struct NegotiatedIcResp {
    pub hdr_digest: bool,
    pub data_digest: bool,
}

/// Writes an icreq and reads back the icresp, returning what the
/// target actually negotiated.
pub async fn handshake(io: &mut DuplexStream, hdr_digest: bool, data_digest: bool) -> NegotiatedIcResp {
    io.write_all(&encode_icreq(hdr_digest, data_digest)).await.expect("write icreq");
    let mut raw = vec![0u8; ICRESP_LEN];
    io.read_exact(&mut raw).await.expect("read icresp");
    assert_eq!(raw[0], PDU_ICRESP);
    let digest = raw[11];
    NegotiatedIcResp { hdr_digest: digest & 0b01 != 0, data_digest: digest & 0b10 != 0 }
}

#[allow(clippy::too_many_arguments)]
pub fn encode_cmd(cid: u16, opcode: u8, offset: u32, length: u32, inline_data: &[u8], hdr_digest: bool, data_digest: bool) -> Vec<u8> {
    let hdgst_len = if hdr_digest { 4u32 } else { 0 };
    let ddgst_len = if data_digest && !inline_data.is_empty() { 4u32 } else { 0 };
    let plen = CMD_HEADER_LEN as u32 + hdgst_len + inline_data.len() as u32 + ddgst_len;
    let mut flags = 0u8;
    if hdr_digest {
        flags |= FLAG_HDGST;
    }
    if data_digest && !inline_data.is_empty() {
        flags |= FLAG_DDGST;
    }

    let mut buf = Vec::new();
    push_generic_header(&mut buf, PDU_CMD, flags, CMD_HEADER_LEN as u8, 0, plen);
    let mut sqe = [0u8; 64];
    sqe[0] = opcode;
    sqe[2..4].copy_from_slice(&cid.to_le_bytes());
    sqe[4..8].copy_from_slice(&offset.to_le_bytes());
    sqe[8..12].copy_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&sqe);

    if hdr_digest {
        let crc = crc32c::crc32c_append(0, &buf[..CMD_HEADER_LEN]);
        buf.extend_from_slice(&crc.to_le_bytes());
    }
    buf.extend_from_slice(inline_data);
    if data_digest && !inline_data.is_empty() {
        let crc = crc32c::crc32c_append(0, inline_data);
        buf.extend_from_slice(&crc.to_le_bytes());
    }
    buf
}

pub fn encode_h2c_data(cccid: u16, ttag: u16, offset: u32, data: &[u8], last: bool, hdr_digest: bool, data_digest: bool) -> Vec<u8> {
    let hdgst_len = if hdr_digest { 4u32 } else { 0 };
    let ddgst_len = if data_digest { 4u32 } else { 0 };
    let plen = H2C_DATA_HEADER_LEN as u32 + hdgst_len + data.len() as u32 + ddgst_len;
    let mut flags = 0u8;
    if hdr_digest {
        flags |= FLAG_HDGST;
    }
    if data_digest {
        flags |= FLAG_DDGST;
    }
    if last {
        flags |= FLAG_LAST_PDU;
    }
    let pdo = H2C_DATA_HEADER_LEN as u8 + hdgst_len as u8;

    let mut buf = Vec::new();
    push_generic_header(&mut buf, PDU_H2C_DATA, flags, H2C_DATA_HEADER_LEN as u8, pdo, plen);
    buf.extend_from_slice(&cccid.to_le_bytes());
    buf.extend_from_slice(&ttag.to_le_bytes());
    buf.extend_from_slice(&offset.to_le_bytes());
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(&[0u8; 4]);

    if hdr_digest {
        let crc = crc32c::crc32c_append(0, &buf[..H2C_DATA_HEADER_LEN]);
        buf.extend_from_slice(&crc.to_le_bytes());
    }
    buf.extend_from_slice(data);
    if data_digest {
        let crc = crc32c::crc32c_append(0, data);
        buf.extend_from_slice(&crc.to_le_bytes());
    }
    buf
}

async fn read_generic_header(io: &mut DuplexStream) -> (u8, u8, u8, u8, u32) {
    let mut raw = [0u8; GENERIC_HEADER_LEN];
    io.read_exact(&mut raw).await.expect("read generic header");
    let plen = u32::from_le_bytes(raw[4..8].try_into().expect("4 bytes"));
    (raw[0], raw[1], raw[2], raw[3], plen)
}

pub struct C2hData {
    pub cccid: u16,
    pub data_offset: u32,
    pub data_length: u32,
    pub last: bool,
    pub success: bool,
    pub data: Vec<u8>,
}

pub async fn read_c2h_data(io: &mut DuplexStream, hdr_digest: bool) -> C2hData {
    let (pdu_type, flags, hlen, _pdo, plen) = read_generic_header(io).await;
    assert_eq!(pdu_type, PDU_C2H_DATA, "expected c2h_data");
    assert_eq!(hlen as usize, C2H_DATA_HEADER_LEN);
    let mut rest = vec![0u8; plen as usize - GENERIC_HEADER_LEN];
    io.read_exact(&mut rest).await.expect("read c2h_data body");

    let cccid = u16::from_le_bytes([rest[0], rest[1]]);
    let data_offset = u32::from_le_bytes(rest[4..8].try_into().expect("4 bytes"));
    let data_length = u32::from_le_bytes(rest[8..12].try_into().expect("4 bytes"));
    let mut pos = C2H_DATA_HEADER_LEN - GENERIC_HEADER_LEN;
    if hdr_digest {
        pos += 4;
    }
    let data = rest[pos..pos + data_length as usize].to_vec();

    C2hData {
        cccid,
        data_offset,
        data_length,
        last: flags & FLAG_LAST_PDU != 0,
        success: flags & FLAG_SUCCESS != 0,
        data,
    }
}

pub struct R2t {
    pub cccid: u16,
    pub ttag: u16,
    pub r2t_offset: u32,
    pub r2t_length: u32,
}

pub async fn read_r2t(io: &mut DuplexStream) -> R2t {
    let (pdu_type, _flags, hlen, _pdo, plen) = read_generic_header(io).await;
    assert_eq!(pdu_type, PDU_R2T, "expected r2t");
    assert_eq!(hlen as usize, R2T_HEADER_LEN);
    let mut rest = vec![0u8; plen as usize - GENERIC_HEADER_LEN];
    io.read_exact(&mut rest).await.expect("read r2t body");

    R2t {
        cccid: u16::from_le_bytes([rest[0], rest[1]]),
        ttag: u16::from_le_bytes([rest[2], rest[3]]),
        r2t_offset: u32::from_le_bytes(rest[4..8].try_into().expect("4 bytes")),
        r2t_length: u32::from_le_bytes(rest[8..12].try_into().expect("4 bytes")),
    }
}

pub async fn read_rsp(io: &mut DuplexStream) -> [u8; 16] {
    let (pdu_type, _flags, hlen, _pdo, plen) = read_generic_header(io).await;
    assert_eq!(pdu_type, PDU_RSP, "expected rsp");
    assert_eq!(hlen as usize, RSP_HEADER_LEN);
    let mut rest = vec![0u8; plen as usize - GENERIC_HEADER_LEN];
    io.read_exact(&mut rest).await.expect("read rsp body");
    let mut cqe = [0u8; 16];
    cqe.copy_from_slice(&rest[..16]);
    cqe
}

pub fn cqe_cid(cqe: &[u8; 16]) -> u16 {
    u16::from_le_bytes([cqe[12], cqe[13]])
}
