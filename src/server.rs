//! 서버 수신 루프
//!
//! 잘 알려진 포트에서 FNAME만 받고, 요청마다 독립된 태스크를 띄운다.
//! 각 태스크는 자기 소켓/윈도우/파일을 따로 가지며 공유하는 것은 에러 모델뿐이다.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::channel::{ErrorModel, RECV_BUF_LEN};
use crate::message::FilenameRequest;
use crate::packet::{self, Flag};
use crate::sender;
use crate::{Config, Error, Result};

/// 파일 송신 서버
pub struct Server {
    config: Config,
    socket: UdpSocket,
    errors: Arc<ErrorModel>,

    /// 진행 중인 전송 (클라이언트 주소 → 파일명)
    active: Arc<DashMap<SocketAddr, String>>,
}

impl Server {
    pub async fn bind(config: Config, addr: SocketAddr) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(addr).await?;

        Ok(Self {
            errors: Arc::new(ErrorModel::from_config(&config)),
            config,
            socket,
            active: Arc::new(DashMap::new()),
        })
    }

    /// 모든 인터페이스에서 수신
    ///
    /// `[::]`에 바인딩해 IPv4/IPv6 요청을 함께 받는다. IPv6를 쓸 수 없는 호스트면 `0.0.0.0`.
    pub async fn bind_any(config: Config, port: u16) -> Result<Self> {
        let dual_stack: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
        match Self::bind(config.clone(), dual_stack).await {
            Err(Error::Io(e)) => {
                warn!("{} 바인딩 실패 ({}), IPv4로 대체", dual_stack, e);
                Self::bind(config, (Ipv4Addr::UNSPECIFIED, port).into()).await
            }
            bound => bound,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 진행 중인 전송 수
    pub fn active_transfers(&self) -> usize {
        self.active.len()
    }

    /// 요청 수신 루프 (종료하지 않음)
    pub async fn run(&self) -> Result<()> {
        info!(
            "SREJ server listening on {} (error rate {})",
            self.local_addr()?,
            self.errors.error_rate()
        );

        let mut buf = vec![0u8; RECV_BUF_LEN];
        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("수신 에러: {}", e);
                    continue;
                }
            };

            if let Err(e) = self.handle_datagram(&buf[..len], peer) {
                debug!("요청 무시 ({}): {}", peer, e);
            }
        }
    }

    fn handle_datagram(&self, bytes: &[u8], peer: SocketAddr) -> Result<bool> {
        let packet = packet::decode(bytes)?;
        if packet.flag != Flag::Fname {
            debug!("FNAME 아닌 패킷 무시: {:?} from {}", packet.flag, peer);
            return Ok(false);
        }

        let request = FilenameRequest::from_payload(&packet.payload)?;
        Ok(self.spawn_transfer(request, peer))
    }

    /// 같은 주소의 전송이 이미 진행 중이면 무시
    fn spawn_transfer(&self, request: FilenameRequest, peer: SocketAddr) -> bool {
        match self.active.entry(peer) {
            Entry::Occupied(entry) => {
                debug!("이미 진행 중인 전송: {} ({})", peer, entry.get());
                return false;
            }
            Entry::Vacant(entry) => {
                entry.insert(request.filename.clone());
            }
        }

        let span = info_span!("transfer", peer = %peer, file = %request.filename);
        let config = self.config.clone();
        let errors = self.errors.clone();
        let active = self.active.clone();

        tokio::spawn(
            async move {
                match sender::serve_transfer(config, request, peer, errors).await {
                    Ok(stats) => info!("전송 종료: {} bytes, {:.2}s", stats.payload_bytes, stats.elapsed().as_secs_f64()),
                    Err(e) => warn!("전송 실패: {}", e),
                }
                active.remove(&peer);
            }
            .instrument(span),
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::TransferParams;

    #[tokio::test]
    async fn test_duplicate_fname_spawns_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let server = Server::bind(Config::loopback(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = client.local_addr().unwrap();

        let request = FilenameRequest::new(
            TransferParams::default(),
            path.to_string_lossy().to_string(),
        )
        .unwrap();
        let fname = request.to_packet().unwrap();

        assert!(server.handle_datagram(&fname, peer).unwrap());
        assert!(!server.handle_datagram(&fname, peer).unwrap());
        assert_eq!(server.active_transfers(), 1);

        // 전송 태스크는 전용 소켓에서 응답
        let mut buf = [0u8; 64];
        let (len, from) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(packet::decode(&buf[..len]).unwrap().flag, Flag::FnameOk);
        assert_ne!(from, server.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_ignores_corrupt_and_non_fname() {
        let server = Server::bind(Config::loopback(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();

        let ack = packet::encode(&[], Flag::Ack, 1).unwrap();
        assert!(!server.handle_datagram(&ack, peer).unwrap());

        let mut corrupt = ack.to_vec();
        corrupt[0] ^= 0x10;
        assert!(server.handle_datagram(&corrupt, peer).is_err());
        assert_eq!(server.active_transfers(), 0);
    }

    #[tokio::test]
    async fn test_unspecified_bind_accepts_ipv4_clients() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.txt");
        tokio::fs::write(&path, b"dual").await.unwrap();

        let server = Server::bind_any(Config::loopback(), 0).await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(async move { server.run().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let fname = FilenameRequest::new(
            TransferParams::default(),
            path.to_string_lossy().to_string(),
        )
        .unwrap()
        .to_packet()
        .unwrap();
        client.send_to(&fname, ("127.0.0.1", port)).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(packet::decode(&buf[..len]).unwrap().flag, Flag::FnameOk);
        assert!(from.ip().is_loopback());
    }
}
