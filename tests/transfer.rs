//! 루프백 전송 통합 테스트
//!
//! 서버는 별도 tokio 태스크로 띄우고, 클라이언트는 `receive_file`로 실제 파일을 받는다.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::net::UdpSocket;

use srej::packet::{self, Flag, Packet};
use srej::{receive_file, Config, Error, FilenameRequest, ReceiveRequest, Server, TransferParams};

async fn start_server(config: Config) -> SocketAddr {
    let server = Server::bind(config, "127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind failed");
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.run().await });
    addr
}

fn random_file(path: &Path, len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    std::fs::write(path, &data).unwrap();
    data
}

fn request(src: &Path, dst: &Path, window: u32, buffer: u32, server: SocketAddr) -> ReceiveRequest {
    ReceiveRequest {
        src: src.to_string_lossy().to_string(),
        dst: dst.to_path_buf(),
        params: TransferParams::new(window, buffer).unwrap(),
        host: server.ip().to_string(),
        port: server.port(),
    }
}

async fn recv_packet(socket: &UdpSocket) -> (Packet, SocketAddr) {
    let mut buf = vec![0u8; 1500];
    let (len, from) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("no packet")
        .unwrap();
    (packet::decode(&buf[..len]).unwrap(), from)
}

// ---------------------------------------------------------------------------
// 손실 없는 전송: 윈도우/버퍼 크기와 무관하게 동일한 파일
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lossless_roundtrip_across_sizes() {
    let server = start_server(Config::loopback()).await;
    let dir = tempfile::tempdir().unwrap();

    let cases: &[(u32, u32, usize)] = &[
        (1, 400, 2_000),
        (1, 1400, 0),
        (5, 512, 512 * 5),
        (10, 1000, 37_777),
        (50, 1400, 200_000),
        (229, 400, 100_003),
    ];

    for (i, &(window, buffer, len)) in cases.iter().enumerate() {
        let src = dir.path().join(format!("src-{}", i));
        let dst = dir.path().join(format!("dst-{}", i));
        let data = random_file(&src, len, i as u64);

        let stats = receive_file(Config::loopback(), request(&src, &dst, window, buffer, server))
            .await
            .unwrap_or_else(|e| panic!("window={} buffer={}: {}", window, buffer, e));

        assert_eq!(std::fs::read(&dst).unwrap(), data, "window={} buffer={}", window, buffer);
        assert_eq!(stats.payload_bytes, len as u64);
        assert_eq!(stats.digest, crc32fast::hash(&data));
    }
}

// ---------------------------------------------------------------------------
// 없는 파일: FNAME_BAD, 출력 파일 생성 안 함
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_file_is_reported() {
    let server = start_server(Config::loopback()).await;
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("missing.txt");
    let dst = dir.path().join("out.txt");

    let result = receive_file(Config::loopback(), request(&src, &dst, 4, 1000, server)).await;

    assert!(matches!(result, Err(Error::FileNotFound(_))));
    assert!(!dst.exists());
}

// ---------------------------------------------------------------------------
// 스크립트 송신자: 4 유실 → SREJ(4) → 4 재전송 → ACK(5)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_srej_recovers_single_loss() {
    let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let child = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let listen_addr = listener.local_addr().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let dst = dir.path().join("out.bin");
    let req = ReceiveRequest {
        src: "remote.bin".into(),
        dst: dst.clone(),
        params: TransferParams::new(8, 400).unwrap(),
        host: "127.0.0.1".into(),
        port: listen_addr.port(),
    };
    let client = tokio::spawn(receive_file(Config::loopback(), req));

    let (fname, client_addr) = recv_packet(&listener).await;
    assert_eq!(fname.flag, Flag::Fname);
    let parsed = FilenameRequest::from_payload(&fname.payload).unwrap();
    assert_eq!(parsed.filename, "remote.bin");
    assert_eq!(parsed.params.window_size, 8);

    let send = |flag: Flag, seq: u32| {
        let payload = if flag.is_data() { vec![seq as u8; 400] } else { Vec::new() };
        packet::encode(&payload, flag, seq).unwrap()
    };

    child.send_to(&send(Flag::FnameOk, 0), client_addr).await.unwrap();
    for seq in [1, 2, 3, 5] {
        child.send_to(&send(Flag::Data, seq), client_addr).await.unwrap();
    }

    for expected in [1, 2, 3] {
        let (ack, _) = recv_packet(&child).await;
        assert_eq!((ack.flag, ack.seq_num), (Flag::Ack, expected));
    }
    let (srej, _) = recv_packet(&child).await;
    assert_eq!((srej.flag, srej.seq_num), (Flag::Srej, 4));

    child.send_to(&send(Flag::SrejData, 4), client_addr).await.unwrap();
    let (ack, _) = recv_packet(&child).await;
    assert_eq!((ack.flag, ack.seq_num), (Flag::Ack, 5));

    child.send_to(&send(Flag::EndOfFile, 6), client_addr).await.unwrap();
    let (eof_ack, _) = recv_packet(&child).await;
    assert_eq!((eof_ack.flag, eof_ack.seq_num), (Flag::EofAck, 6));

    let stats = client.await.unwrap().unwrap();
    assert_eq!(stats.srejs_sent, 1);

    let written = std::fs::read(&dst).unwrap();
    let expected: Vec<u8> = (1..=5u8).flat_map(|seq| vec![seq; 400]).collect();
    assert_eq!(written, expected);
}

// ---------------------------------------------------------------------------
// FNAME_OK 유실: 첫 DATA가 곧 수락 응답
// ---------------------------------------------------------------------------

/// 가짜 리스너에 FNAME을 보내게 하고 (클라이언트 태스크, 클라이언트 주소, 자식 소켓) 반환
async fn scripted_client(
    dst: &Path,
) -> (
    tokio::task::JoinHandle<srej::Result<srej::TransferStats>>,
    SocketAddr,
    UdpSocket,
) {
    let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let child = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let req = ReceiveRequest {
        src: "remote.bin".into(),
        dst: dst.to_path_buf(),
        params: TransferParams::new(4, 400).unwrap(),
        host: "127.0.0.1".into(),
        port: listener.local_addr().unwrap().port(),
    };
    let client = tokio::spawn(receive_file(Config::loopback(), req));

    let (fname, client_addr) = recv_packet(&listener).await;
    assert_eq!(fname.flag, Flag::Fname);
    (client, client_addr, child)
}

fn data_packet(flag: Flag, seq: u32) -> bytes::Bytes {
    packet::encode(&[seq as u8; 400], flag, seq).unwrap()
}

#[tokio::test]
async fn test_lost_fname_ok_first_data_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let dst = dir.path().join("out.bin");
    let (client, client_addr, child) = scripted_client(&dst).await;

    // FNAME_OK 없이 바로 DATA(1)
    child.send_to(&data_packet(Flag::Data, 1), client_addr).await.unwrap();
    let (ack, _) = recv_packet(&child).await;
    assert_eq!((ack.flag, ack.seq_num), (Flag::Ack, 1));

    let eof = packet::encode(&[], Flag::EndOfFile, 2).unwrap();
    child.send_to(&eof, client_addr).await.unwrap();
    let (eof_ack, _) = recv_packet(&child).await;
    assert_eq!((eof_ack.flag, eof_ack.seq_num), (Flag::EofAck, 2));

    let stats = client.await.unwrap().unwrap();
    assert_eq!(stats.payload_bytes, 400);
    assert_eq!(std::fs::read(&dst).unwrap(), vec![1u8; 400]);
}

// ---------------------------------------------------------------------------
// 손상 패킷: 응답 없이 버림
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_corrupt_data_gets_no_reply() {
    let dir = tempfile::tempdir().unwrap();
    let dst = dir.path().join("out.bin");
    let (client, client_addr, child) = scripted_client(&dst).await;

    let ok = packet::encode(&[], Flag::FnameOk, 0).unwrap();
    child.send_to(&ok, client_addr).await.unwrap();
    child.send_to(&data_packet(Flag::Data, 1), client_addr).await.unwrap();
    let (ack, _) = recv_packet(&child).await;
    assert_eq!((ack.flag, ack.seq_num), (Flag::Ack, 1));

    // 페이로드 한 비트 반전
    let mut corrupt = data_packet(Flag::Data, 2).to_vec();
    corrupt[100] ^= 0x04;
    child.send_to(&corrupt, client_addr).await.unwrap();

    let mut buf = [0u8; 64];
    let silent = tokio::time::timeout(Duration::from_millis(200), child.recv_from(&mut buf)).await;
    assert!(silent.is_err(), "corrupt packet must not be answered");

    // 정상 재전송은 그대로 처리
    child.send_to(&data_packet(Flag::TimeoutData, 2), client_addr).await.unwrap();
    let (ack, _) = recv_packet(&child).await;
    assert_eq!((ack.flag, ack.seq_num), (Flag::Ack, 2));

    let eof = packet::encode(&[], Flag::EndOfFile, 3).unwrap();
    child.send_to(&eof, client_addr).await.unwrap();
    let (eof_ack, _) = recv_packet(&child).await;
    assert_eq!((eof_ack.flag, eof_ack.seq_num), (Flag::EofAck, 3));

    let stats = client.await.unwrap().unwrap();
    assert_eq!(stats.corrupt_packets, 1);
    let expected: Vec<u8> = [vec![1u8; 400], vec![2u8; 400]].concat();
    assert_eq!(std::fs::read(&dst).unwrap(), expected);
}

// ---------------------------------------------------------------------------
// 응답 없는 서버: 재시도 한도 후 종료
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_silent_server_gives_up() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let dst = dir.path().join("never.bin");

    let mut config = Config::loopback();
    config.short_timeout = Duration::from_millis(10);

    let result = receive_file(
        config,
        request(Path::new("x.bin"), &dst, 4, 400, silent.local_addr().unwrap()),
    )
    .await;

    assert!(matches!(result, Err(Error::PeerUnreachable { tries: 10 })));
    assert!(!dst.exists());

    // 매 타임아웃마다 FNAME 재전송
    let mut fnames = 0;
    let mut buf = [0u8; 1500];
    while let Ok(Ok((len, _))) =
        tokio::time::timeout(Duration::from_millis(50), silent.recv_from(&mut buf)).await
    {
        assert_eq!(packet::decode(&buf[..len]).unwrap().flag, Flag::Fname);
        fnames += 1;
    }
    assert_eq!(fnames, 11);
}

// ---------------------------------------------------------------------------
// 손실 채널 (시드 고정): 양쪽 모두 드롭/비트 반전
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lossy_channel_delivers_identical_file() {
    let server = start_server(Config::loopback().with_error_rate(0.05).with_seed(11)).await;
    let dir = tempfile::tempdir().unwrap();

    let src = dir.path().join("lossy-src");
    let dst = dir.path().join("lossy-dst");
    let data = random_file(&src, 60_000, 42);

    let config = Config::loopback().with_error_rate(0.05).with_seed(7);
    let stats = receive_file(config, request(&src, &dst, 8, 700, server))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dst).unwrap(), data);
    assert_eq!(stats.digest, crc32fast::hash(&data));
}

#[tokio::test]
async fn test_concurrent_transfers_are_isolated() {
    let server = start_server(Config::loopback()).await;
    let dir = tempfile::tempdir().unwrap();

    let mut clients = Vec::new();
    let mut expected = Vec::new();
    for i in 0..4u64 {
        let src = dir.path().join(format!("c-src-{}", i));
        let dst = dir.path().join(format!("c-dst-{}", i));
        expected.push((dst.clone(), random_file(&src, 20_000 + i as usize * 1_111, 100 + i)));
        clients.push(tokio::spawn(receive_file(
            Config::loopback(),
            request(&src, &dst, 3 + i as u32, 600, server),
        )));
    }

    for client in clients {
        client.await.unwrap().unwrap();
    }
    for (dst, data) in expected {
        assert_eq!(std::fs::read(&dst).unwrap(), data);
    }
}
