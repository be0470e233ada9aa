//! 송신자 (서버측)
//!
//! 요청 하나당 하나의 전송. 전용 소켓, 윈도우, 원본 파일을 소유한다.
//!
//! ```text
//! FILENAME → SEND ⇄ WAIT_FEEDBACK ⇄ TIMEOUT_RESEND
//!             ↓
//!       WAIT_EOF_ACK ⇄ TIMEOUT_EOF_RESEND → DONE
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{debug, info, trace, warn};

use crate::channel::{Channel, ErrorModel};
use crate::message::FilenameRequest;
use crate::packet::{self, Flag, Packet};
use crate::retry::{RetryController, Wait};
use crate::stats::TransferStats;
use crate::window::SenderWindow;
use crate::{Config, Error, Result};

/// 송신자 상태 (FILENAME 단계는 `Transfer::accept`가 처리)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SenderState {
    Send,
    WaitFeedback,
    TimeoutResend,
    WaitEofAck,
    TimeoutEofResend,
    Done,
}

/// 진행 중인 전송 하나
struct Transfer {
    request: FilenameRequest,
    channel: Channel,
    window: SenderWindow,
    source: BufReader<File>,
    retry: RetryController,
    stats: TransferStats,
    digest: crc32fast::Hasher,

    /// END_OF_FILE을 보낸 뒤에만 Some
    eof_seq: Option<u32>,
}

impl Transfer {
    /// FILENAME 단계: 원본 파일을 열고 FNAME_OK / FNAME_BAD 응답
    async fn accept(
        config: &Config,
        request: FilenameRequest,
        client: SocketAddr,
        errors: Arc<ErrorModel>,
    ) -> Result<Self> {
        let mut channel = Channel::bind_for(client, errors).await?;
        let mut stats = TransferStats::new();

        let file = match File::open(&request.filename).await {
            Ok(file) => file,
            Err(e) => {
                warn!("파일 열기 실패: {} ({})", request.filename, e);
                channel.send_packet(&[], Flag::FnameBad, 0).await?;
                return Err(Error::FileNotFound(request.filename));
            }
        };

        let window = SenderWindow::new(request.params.window_size)?;
        channel.send_packet(&[], Flag::FnameOk, 0).await?;
        stats.packets_sent += 1;

        info!(
            "전송 시작: {} -> {} (window={}, buffer={}, local={})",
            request.filename,
            client,
            request.params.window_size,
            request.params.buffer_size,
            channel.local_addr()?
        );

        Ok(Self {
            channel,
            window,
            source: BufReader::new(file),
            retry: RetryController::from_config(config),
            stats,
            digest: crc32fast::Hasher::new(),
            eof_seq: None,
            request,
        })
    }

    async fn run(mut self) -> Result<TransferStats> {
        let mut state = SenderState::Send;

        while state != SenderState::Done {
            trace!("state: {:?}", state);
            state = match state {
                SenderState::Send => self.send().await?,
                SenderState::WaitFeedback => self.wait_feedback().await?,
                SenderState::TimeoutResend => self.timeout_resend().await?,
                SenderState::WaitEofAck => self.wait_eof_ack().await?,
                SenderState::TimeoutEofResend => self.timeout_eof_resend().await?,
                SenderState::Done => SenderState::Done,
            };
        }

        self.stats.finish();
        self.stats.digest = self.digest.clone().finalize();
        self.stats.injected_drops = self.channel.dropped();
        self.stats.injected_flips = self.channel.flipped();
        info!("전송 완료: {} | {}", self.request.filename, self.stats.summary());
        Ok(self.stats)
    }

    /// 버퍼 크기만큼 읽기. 파일 끝이면 빈 Bytes
    async fn read_chunk(&mut self) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(self.request.params.buffer_size as usize);
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.source.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf.freeze())
    }

    async fn send(&mut self) -> Result<SenderState> {
        if !self.window.is_open() {
            return Ok(SenderState::WaitFeedback);
        }

        let chunk = self.read_chunk().await?;
        if chunk.is_empty() {
            let eof_seq = self.window.current();
            self.eof_seq = Some(eof_seq);
            self.send_eof().await?;
            info!("END_OF_FILE 전송: seq={}", eof_seq);
            return Ok(SenderState::WaitEofAck);
        }

        let seq_num = self.window.current();
        self.digest.update(&chunk);
        self.stats.payload_bytes += chunk.len() as u64;

        self.window.add_pane(chunk.clone(), seq_num)?;
        self.channel.send_packet(&chunk, Flag::Data, seq_num).await?;
        self.stats.packets_sent += 1;
        self.stats.data_packets += 1;
        trace!("DATA 전송: seq={} {} bytes", seq_num, chunk.len());

        // 전송 사이 논블로킹 피드백 확인
        self.drain_feedback().await?;
        Ok(SenderState::Send)
    }

    async fn wait_feedback(&mut self) -> Result<SenderState> {
        self.drain_feedback().await?;
        if self.window.is_open() {
            return Ok(SenderState::Send);
        }

        match self.retry.wait(&self.channel).await {
            Wait::Ready => Ok(SenderState::WaitFeedback),
            Wait::Timeout => Ok(SenderState::TimeoutResend),
            Wait::GiveUp => Err(self.give_up()),
        }
    }

    async fn timeout_resend(&mut self) -> Result<SenderState> {
        if let Some(seq_num) = self.window.oldest_unacked() {
            self.resend(seq_num, Flag::TimeoutData).await?;
        }
        Ok(SenderState::WaitFeedback)
    }

    async fn wait_eof_ack(&mut self) -> Result<SenderState> {
        if self.drain_feedback().await? {
            return Ok(SenderState::Done);
        }

        match self.retry.wait(&self.channel).await {
            Wait::Ready => Ok(SenderState::WaitEofAck),
            Wait::Timeout => Ok(SenderState::TimeoutEofResend),
            Wait::GiveUp => Err(self.give_up()),
        }
    }

    /// 미확인 데이터가 남아 있으면 그것부터, 없으면 END_OF_FILE 재전송
    async fn timeout_eof_resend(&mut self) -> Result<SenderState> {
        match self.window.oldest_unacked() {
            Some(seq_num) => self.resend(seq_num, Flag::TimeoutData).await?,
            None => {
                debug!("END_OF_FILE 재전송 ({}/{})", self.retry.count(), self.retry.max_tries());
                self.send_eof().await?;
            }
        }
        Ok(SenderState::WaitEofAck)
    }

    fn give_up(&self) -> Error {
        warn!(
            "{} 전송 포기: lower={}, current={}",
            self.request.filename,
            self.window.lower(),
            self.window.current()
        );
        Error::PeerUnreachable {
            tries: self.retry.max_tries(),
        }
    }

    async fn send_eof(&mut self) -> Result<()> {
        let eof_seq = self.eof_seq.unwrap_or_else(|| self.window.current());
        self.channel
            .send_packet(&[], Flag::EndOfFile, eof_seq)
            .await?;
        self.stats.packets_sent += 1;
        Ok(())
    }

    async fn resend(&mut self, seq_num: u32, flag: Flag) -> Result<()> {
        match self.window.resend(seq_num, flag, &mut self.channel).await {
            Ok(_) => {
                self.stats.packets_sent += 1;
                if flag == Flag::SrejData {
                    self.stats.srej_retransmits += 1;
                } else {
                    self.stats.timeout_retransmits += 1;
                }
                Ok(())
            }
            Err(Error::PaneNotFound { .. }) => {
                debug!("재전송 대상 없음: seq={}", seq_num);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// 쌓여 있는 피드백을 모두 처리. EOF_ACK를 받았으면 true
    async fn drain_feedback(&mut self) -> Result<bool> {
        while let Some((bytes, from)) = self.channel.try_recv()? {
            if from != self.channel.peer() {
                debug!("다른 주소에서 온 패킷 무시: {}", from);
                continue;
            }
            let packet = match packet::decode(&bytes) {
                Ok(packet) => packet,
                Err(Error::Corrupt) => {
                    self.stats.corrupt_packets += 1;
                    debug!("CRC_ERROR: {} bytes 패킷 버림", bytes.len());
                    continue;
                }
                Err(e) => {
                    debug!("패킷 무시: {}", e);
                    continue;
                }
            };
            if self.on_feedback(packet).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn on_feedback(&mut self, packet: Packet) -> Result<bool> {
        match packet.flag {
            Flag::Ack => {
                self.stats.acks_received += 1;
                match self.window.ack_through(packet.seq_num) {
                    Ok(0) => trace!("지난 ACK: {}", packet.seq_num),
                    Ok(n) => trace!("ACK {}: {}개 확인, lower={}", packet.seq_num, n, self.window.lower()),
                    Err(Error::PaneNotFound { seq_num }) => {
                        debug!("범위 밖 ACK 무시: {}", seq_num)
                    }
                    Err(e) => return Err(e),
                }
            }
            Flag::Srej => {
                self.stats.srejs_received += 1;
                debug!("SREJ {} 수신", packet.seq_num);
                self.resend(packet.seq_num, Flag::SrejData).await?;
            }
            Flag::EofAck if self.eof_seq == Some(packet.seq_num) => {
                info!("EOF_ACK 수신: seq={}", packet.seq_num);
                return Ok(true);
            }
            flag => debug!("예상하지 않은 피드백 무시: {:?} seq={}", flag, packet.seq_num),
        }
        Ok(false)
    }
}

/// 요청 하나를 처음부터 끝까지 처리
///
/// `client`는 FNAME을 보낸 주소. 응답은 새로 연 전용 소켓에서 나간다.
pub async fn serve_transfer(
    config: Config,
    request: FilenameRequest,
    client: SocketAddr,
    errors: Arc<ErrorModel>,
) -> Result<TransferStats> {
    Transfer::accept(&config, request, client, errors)
        .await?
        .run()
        .await
}
