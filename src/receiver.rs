//! 수신자 (클라이언트측)
//!
//! ```text
//! START → FNAME_SENT → FILE_OPENED → RECEIVING → DONE
//! ```
//!
//! - 순서가 어긋난 DATA는 버퍼에 보관하고 가장 낮은 빈 seq를 SREJ로 요청
//! - 기록이 진행될 때마다 누적 ACK 전송
//! - 손상 패킷은 응답 없이 버림 (송신자 타임아웃에 맡김)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::lookup_host;
use tracing::{debug, info, trace, warn};

use crate::buffer::{AddOutcome, ReceiverBuffer};
use crate::channel::{Channel, ErrorModel};
use crate::config::TransferParams;
use crate::message::FilenameRequest;
use crate::packet::{self, Flag, Packet};
use crate::retry::{RetryController, Wait};
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 파일 요청 인자
#[derive(Debug, Clone)]
pub struct ReceiveRequest {
    /// 송신자 측 원본 경로
    pub src: String,

    /// 로컬 저장 경로
    pub dst: PathBuf,

    /// 윈도우/버퍼 크기
    pub params: TransferParams,

    pub host: String,
    pub port: u16,
}

/// 수신자 상태
enum ReceiverState {
    /// FNAME (재)전송. 재시도 시에는 기존 소켓을 그대로 쓴다.
    Start(Option<Channel>),

    FnameSent(Channel),

    /// `first`: 핸드쉐이크 중에 먼저 도착한 패킷 (FNAME_OK 유실)
    FileOpened {
        channel: Channel,
        first: Option<Packet>,
    },

    Receiving(Session),

    Done,
}

/// RECEIVING 단계에서 쓰는 자원 묶음
struct Session {
    channel: Channel,
    buffer: ReceiverBuffer,
    output: BufWriter<File>,
}

impl Session {
    /// 패킷 하나 처리. 전송이 끝났으면 true
    async fn handle(&mut self, packet: Packet, stats: &mut TransferStats) -> Result<bool> {
        let expected = self.buffer.next_expected();

        match packet.flag {
            Flag::EndOfFile if packet.seq_num == expected => {
                self.send_control(Flag::EofAck, packet.seq_num, stats).await?;
                info!("END_OF_FILE 수신: seq={}", packet.seq_num);
                Ok(true)
            }
            Flag::EndOfFile if packet.seq_num > expected => {
                debug!(
                    "데이터가 남은 상태의 END_OF_FILE: seq={}, expected={}",
                    packet.seq_num, expected
                );
                self.send_srej(stats).await?;
                Ok(false)
            }
            flag if flag.is_data() => {
                self.on_data(packet.seq_num, packet.payload, stats).await?;
                Ok(false)
            }
            flag => {
                debug!("수신 중 예상하지 않은 패킷 무시: {:?} seq={}", flag, packet.seq_num);
                Ok(false)
            }
        }
    }

    async fn on_data(&mut self, seq_num: u32, payload: Bytes, stats: &mut TransferStats) -> Result<()> {
        let expected = self.buffer.next_expected();

        if seq_num < expected {
            stats.duplicate_packets += 1;
            debug!("이미 기록된 패킷: seq={}, ACK {} 재전송", seq_num, self.buffer.last_committed());
            return self.send_ack(stats).await;
        }

        if seq_num == expected {
            self.buffer.add_packet(payload, seq_num)?;
            let written = self.buffer.flush(&mut self.output).await?;
            trace!("{} bytes 기록, 다음 seq={}", written, self.buffer.next_expected());

            self.send_ack(stats).await?;
            if self.buffer.lowest_missing().is_some() {
                self.send_srej(stats).await?;
            }
            return Ok(());
        }

        match self.buffer.add_packet(payload, seq_num) {
            Ok(AddOutcome::Stored) => {
                debug!("순서 밖 패킷 보관: seq={}, expected={}", seq_num, expected)
            }
            Ok(AddOutcome::Duplicate) => stats.duplicate_packets += 1,
            Err(Error::OutOfWindow { .. }) => {
                debug!("버퍼 범위 밖 패킷 버림: seq={}", seq_num)
            }
            Err(e) => return Err(e),
        }
        self.send_srej(stats).await
    }

    async fn send_ack(&mut self, stats: &mut TransferStats) -> Result<()> {
        stats.acks_sent += 1;
        self.send_control(Flag::Ack, self.buffer.last_committed(), stats)
            .await
    }

    async fn send_srej(&mut self, stats: &mut TransferStats) -> Result<()> {
        let missing = self
            .buffer
            .lowest_missing()
            .unwrap_or_else(|| self.buffer.next_expected());
        stats.srejs_sent += 1;
        debug!("SREJ {} 전송", missing);
        self.send_control(Flag::Srej, missing, stats).await
    }

    async fn send_control(&mut self, flag: Flag, seq_num: u32, stats: &mut TransferStats) -> Result<()> {
        self.channel.send_packet(&[], flag, seq_num).await?;
        stats.packets_sent += 1;
        Ok(())
    }
}

/// 수신 상태 머신
struct Receiver {
    config: Config,
    request: ReceiveRequest,
    fname_packet: Bytes,
    errors: Arc<ErrorModel>,
    retry: RetryController,
    server_addr: Option<SocketAddr>,
    stats: TransferStats,
}

impl Receiver {
    fn new(config: Config, request: ReceiveRequest) -> Result<Self> {
        config.validate()?;
        let fname = FilenameRequest::new(request.params, request.src.clone())?;

        Ok(Self {
            fname_packet: fname.to_packet()?,
            errors: Arc::new(ErrorModel::from_config(&config)),
            retry: RetryController::from_config(&config),
            server_addr: None,
            stats: TransferStats::new(),
            config,
            request,
        })
    }

    async fn run(mut self) -> Result<TransferStats> {
        let mut state = ReceiverState::Start(None);

        loop {
            state = match state {
                ReceiverState::Start(channel) => self.start(channel).await?,
                ReceiverState::FnameSent(channel) => self.fname_sent(channel).await?,
                ReceiverState::FileOpened { channel, first } => {
                    self.file_opened(channel, first).await?
                }
                ReceiverState::Receiving(session) => self.receiving(session).await?,
                ReceiverState::Done => break,
            };
        }

        self.stats.finish();
        info!("수신 완료: {}", self.stats.summary());
        Ok(self.stats)
    }

    async fn resolve(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.server_addr {
            return Ok(addr);
        }

        let host = self.request.host.as_str();
        let port = self.request.port;
        let addr = lookup_host((host, port))
            .await
            .map_err(|e| Error::AddrResolution(format!("{}:{} ({})", host, port, e)))?
            .next()
            .ok_or_else(|| Error::AddrResolution(format!("{}:{}", host, port)))?;

        self.server_addr = Some(addr);
        Ok(addr)
    }

    async fn start(&mut self, channel: Option<Channel>) -> Result<ReceiverState> {
        let server = self.resolve().await?;
        let mut channel = match channel {
            Some(mut channel) => {
                channel.set_peer(server);
                channel
            }
            None => Channel::bind_for(server, self.errors.clone()).await?,
        };

        channel.send(&self.fname_packet).await?;
        self.stats.packets_sent += 1;
        debug!("FNAME 전송: {} -> {}", self.request.src, server);

        Ok(ReceiverState::FnameSent(channel))
    }

    async fn fname_sent(&mut self, mut channel: Channel) -> Result<ReceiverState> {
        match self.retry.wait(&channel).await {
            Wait::Ready => {}
            Wait::Timeout => {
                debug!("FNAME 응답 없음, 재전송 ({}/{})", self.retry.count(), self.retry.max_tries());
                return Ok(ReceiverState::Start(Some(channel)));
            }
            Wait::GiveUp => {
                return Err(Error::PeerUnreachable {
                    tries: self.retry.max_tries(),
                })
            }
        }

        let Some((bytes, from)) = channel.try_recv()? else {
            return Ok(ReceiverState::FnameSent(channel));
        };
        let Some(packet) = decode(&bytes, &mut self.stats) else {
            return Ok(ReceiverState::FnameSent(channel));
        };

        match packet.flag {
            Flag::FnameBad => {
                warn!("송신자에 파일 없음: {}", self.request.src);
                Err(Error::FileNotFound(self.request.src.clone()))
            }
            Flag::FnameOk => {
                info!("FNAME_OK 수신, 전송 소켓 {}", from);
                channel.set_peer(from);
                Ok(ReceiverState::FileOpened {
                    channel,
                    first: None,
                })
            }
            flag if flag.is_data() || flag == Flag::EndOfFile => {
                debug!("FNAME_OK 없이 전송 시작됨: {:?} seq={}", flag, packet.seq_num);
                channel.set_peer(from);
                Ok(ReceiverState::FileOpened {
                    channel,
                    first: Some(packet),
                })
            }
            flag => {
                debug!("핸드쉐이크 중 예상하지 않은 패킷 무시: {:?}", flag);
                Ok(ReceiverState::FnameSent(channel))
            }
        }
    }

    async fn file_opened(&mut self, channel: Channel, first: Option<Packet>) -> Result<ReceiverState> {
        let file = File::create(&self.request.dst).await?;
        info!("출력 파일 생성: {}", self.request.dst.display());

        let mut session = Session {
            channel,
            buffer: ReceiverBuffer::new(self.request.params.window_size)?,
            output: BufWriter::new(file),
        };

        if let Some(packet) = first {
            if session.handle(packet, &mut self.stats).await? {
                return self.finish(session).await;
            }
        }
        Ok(ReceiverState::Receiving(session))
    }

    async fn receiving(&mut self, mut session: Session) -> Result<ReceiverState> {
        let timeout = self.config.long_timeout;
        let Some((bytes, from)) = session.channel.recv_within(timeout).await? else {
            warn!("{:?} 동안 송신자 응답 없음, 수신 중단", timeout);
            session.output.flush().await?;
            return Err(Error::RecvTimeout {
                secs: timeout.as_secs(),
            });
        };

        if from != session.channel.peer() {
            debug!("다른 주소에서 온 패킷 무시: {}", from);
            return Ok(ReceiverState::Receiving(session));
        }
        let Some(packet) = decode(&bytes, &mut self.stats) else {
            return Ok(ReceiverState::Receiving(session));
        };

        if session.handle(packet, &mut self.stats).await? {
            self.finish(session).await
        } else {
            Ok(ReceiverState::Receiving(session))
        }
    }

    async fn finish(&mut self, mut session: Session) -> Result<ReceiverState> {
        session.output.flush().await?;

        self.stats.payload_bytes = session.buffer.bytes_written();
        self.stats.digest = session.buffer.digest();
        self.stats.injected_drops = session.channel.dropped();
        self.stats.injected_flips = session.channel.flipped();
        Ok(ReceiverState::Done)
    }
}

/// 손상/형식 오류 패킷은 통계만 남기고 버린다
fn decode(bytes: &[u8], stats: &mut TransferStats) -> Option<Packet> {
    match packet::decode(bytes) {
        Ok(packet) => Some(packet),
        Err(Error::Corrupt) => {
            stats.corrupt_packets += 1;
            debug!("CRC_ERROR: {} bytes 패킷 버림", bytes.len());
            None
        }
        Err(e) => {
            debug!("패킷 무시: {}", e);
            None
        }
    }
}

/// 원격 파일을 받아 `request.dst`에 저장
///
/// 송신자가 파일을 찾지 못하면 `Error::FileNotFound`를 반환하고 출력 파일은 만들지 않는다.
pub async fn receive_file(config: Config, request: ReceiveRequest) -> Result<TransferStats> {
    info!(
        "파일 요청: {} -> {} ({}:{}, window={}, buffer={})",
        request.src,
        request.dst.display(),
        request.host,
        request.port,
        request.params.window_size,
        request.params.buffer_size
    );
    Receiver::new(config, request)?.run().await
}
