//! 손실 채널
//!
//! UDP 소켓 하나와 상대 주소를 묶고, 송신 시 설정된 에러율에 따라
//! 패킷을 버리거나 비트 하나를 뒤집는다. 수신은 그대로 통과시킨다.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tracing::trace;

use crate::packet::{self, Flag};
use crate::{Config, Result};

/// 수신 버퍼 크기. 이보다 큰 데이터그램은 잘려서 체크섬 오류가 된다.
pub(crate) const RECV_BUF_LEN: usize = 1500;

/// 송신 패킷 하나에 적용된 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// 손상 없음
    None,

    /// 전송하지 않음
    Dropped,

    /// 해당 비트를 뒤집어 전송
    Flipped { bit: usize },
}

/// 에러 주입 모델
///
/// 여러 전송이 같은 모델을 공유할 수 있도록 RNG는 잠금으로 보호한다.
#[derive(Debug)]
pub struct ErrorModel {
    error_rate: f64,
    rng: Mutex<StdRng>,
}

impl ErrorModel {
    pub fn new(error_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            error_rate,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.error_rate, config.seed)
    }

    /// 에러 없는 모델
    pub fn disabled() -> Self {
        Self::new(0.0, Some(0))
    }

    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    /// `len` 바이트 패킷에 적용할 결과 추첨
    pub fn sample(&self, len: usize) -> Fault {
        if self.error_rate <= 0.0 || len == 0 {
            return Fault::None;
        }

        let mut rng = self.rng.lock();
        if rng.gen_bool(self.error_rate) {
            return Fault::Dropped;
        }
        if rng.gen_bool(self.error_rate) {
            return Fault::Flipped {
                bit: rng.gen_range(0..len * 8),
            };
        }
        Fault::None
    }
}

/// 상대방 하나와 통신하는 채널
#[derive(Debug)]
pub struct Channel {
    socket: UdpSocket,
    peer: SocketAddr,
    errors: Arc<ErrorModel>,
    dropped: u64,
    flipped: u64,
}

impl Channel {
    pub fn new(socket: UdpSocket, peer: SocketAddr, errors: Arc<ErrorModel>) -> Self {
        Self {
            socket,
            peer,
            errors,
            dropped: 0,
            flipped: 0,
        }
    }

    /// 상대 주소 체계에 맞는 새 소켓(임시 포트)을 열어 채널 생성
    pub async fn bind_for(peer: SocketAddr, errors: Arc<ErrorModel>) -> Result<Self> {
        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self::new(socket, peer, errors))
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// 응답을 보낸 쪽으로 상대 주소 변경
    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = peer;
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 에러 주입으로 버려진 패킷 수
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 에러 주입으로 손상된 패킷 수
    pub fn flipped(&self) -> u64 {
        self.flipped
    }

    /// 원시 바이트 전송 (에러 주입 적용)
    ///
    /// 버려진 경우에도 전송한 것처럼 길이를 반환한다.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<usize> {
        match self.errors.sample(bytes.len()) {
            Fault::None => Ok(self.socket.send_to(bytes, self.peer).await?),
            Fault::Dropped => {
                self.dropped += 1;
                trace!("패킷 드롭 (주입): {} bytes", bytes.len());
                Ok(bytes.len())
            }
            Fault::Flipped { bit } => {
                self.flipped += 1;
                trace!("비트 반전 (주입): bit {}", bit);
                let mut corrupted = bytes.to_vec();
                corrupted[bit / 8] ^= 1 << (bit % 8);
                Ok(self.socket.send_to(&corrupted, self.peer).await?)
            }
        }
    }

    /// 프레이밍 후 전송
    pub async fn send_packet(&mut self, payload: &[u8], flag: Flag, seq_num: u32) -> Result<usize> {
        let bytes = packet::encode(payload, flag, seq_num)?;
        self.send(&bytes).await
    }

    /// 제한 시간 동안 읽을 데이터가 생기는지 대기
    pub async fn ready(&self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.socket.readable()).await,
            Ok(Ok(()))
        )
    }

    /// 논블로킹 수신. 읽을 것이 없으면 `None`
    pub fn try_recv(&self) -> Result<Option<(Bytes, SocketAddr)>> {
        let mut buf = vec![0u8; RECV_BUF_LEN];
        match self.socket.try_recv_from(&mut buf) {
            Ok((len, from)) => {
                buf.truncate(len);
                Ok(Some((Bytes::from(buf), from)))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 제한 시간 동안 블로킹 수신. 시간 초과면 `None`
    pub async fn recv_within(&self, timeout: Duration) -> Result<Option<(Bytes, SocketAddr)>> {
        let mut buf = vec![0u8; RECV_BUF_LEN];
        match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => {
                buf.truncate(len);
                Ok(Some((Bytes::from(buf), from)))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }
}
