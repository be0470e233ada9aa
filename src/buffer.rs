//! 수신 버퍼
//!
//! 순서가 어긋나 도착한 패킷을 `[next_to_write, next_to_write + size)` 범위 안에서
//! 보관하다가, 연속 구간이 만들어지면 순서대로 파일에 기록한다.
//! 같은 패킷이 여러 번 도착해도 한 번만 기록된다.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::{Error, Result, MAX_WINDOW_SIZE, START_SEQ_NUM};

/// `add_packet` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// 새로 보관됨
    Stored,

    /// 이미 보관 중인 패킷 (무시)
    Duplicate,
}

/// 수신 측 재정렬 버퍼
pub struct ReceiverBuffer {
    size: u32,
    next_to_write: u32,
    slots: Vec<Option<Bytes>>,
    pending: u32,
    bytes_written: u64,
    digest: crc32fast::Hasher,
}

impl ReceiverBuffer {
    pub fn new(size: u32) -> Result<Self> {
        if size == 0 || size > MAX_WINDOW_SIZE {
            return Err(Error::InvalidWindowSize(size));
        }
        Ok(Self {
            size,
            next_to_write: START_SEQ_NUM,
            slots: vec![None; size as usize],
            pending: 0,
            bytes_written: 0,
            digest: crc32fast::Hasher::new(),
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    fn slot(&self, seq_num: u32) -> usize {
        (seq_num % self.size) as usize
    }

    /// 보관 여유가 있는지
    pub fn is_open(&self) -> bool {
        self.pending < self.size
    }

    /// 아직 기록되지 않은 패킷 수
    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// 다음에 기록할 seq
    pub fn next_expected(&self) -> u32 {
        self.next_to_write
    }

    /// 마지막으로 기록된 seq (누적 ACK 값)
    pub fn last_committed(&self) -> u32 {
        self.next_to_write - 1
    }

    /// 지금 바로 기록할 수 있는 패킷이 있는지
    pub fn needs_flush(&self) -> bool {
        self.slots[self.slot(self.next_to_write)].is_some()
    }

    /// 패킷 보관
    pub fn add_packet(&mut self, data: Bytes, seq_num: u32) -> Result<AddOutcome> {
        let high = self.next_to_write + self.size;
        if seq_num < self.next_to_write || seq_num >= high {
            return Err(Error::OutOfWindow {
                seq_num,
                low: self.next_to_write,
                high,
            });
        }

        let idx = self.slot(seq_num);
        if self.slots[idx].is_some() {
            trace!("중복 패킷 무시: seq={}", seq_num);
            return Ok(AddOutcome::Duplicate);
        }

        self.slots[idx] = Some(data);
        self.pending += 1;
        Ok(AddOutcome::Stored)
    }

    /// 보관 중인 패킷보다 앞에 있는 가장 낮은 빈 seq
    ///
    /// 보관된 패킷이 없거나 빈 칸 없이 이어져 있으면 `None`.
    pub fn lowest_missing(&self) -> Option<u32> {
        if self.pending == 0 {
            return None;
        }

        let range = self.next_to_write..self.next_to_write + self.size;
        let gap = range
            .clone()
            .find(|&seq| self.slots[self.slot(seq)].is_none())?;
        range
            .skip_while(|&seq| seq <= gap)
            .any(|seq| self.slots[self.slot(seq)].is_some())
            .then_some(gap)
    }

    /// `next_to_write`부터 연속된 패킷을 순서대로 기록
    ///
    /// 첫 번째 빈 칸에서 멈추고 기록한 총 바이트 수를 반환한다.
    pub async fn flush<W>(&mut self, out: &mut W) -> Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let mut total = 0;
        loop {
            let idx = self.slot(self.next_to_write);
            let data = match self.slots[idx].take() {
                Some(data) => data,
                None => break,
            };

            out.write_all(&data).await?;
            self.digest.update(&data);
            total += data.len();

            trace!("기록: seq={} {} bytes", self.next_to_write, data.len());
            self.pending -= 1;
            self.next_to_write += 1;
        }

        self.bytes_written += total as u64;
        Ok(total)
    }

    /// 지금까지 기록한 바이트 수
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// 지금까지 기록한 데이터의 CRC32
    pub fn digest(&self) -> u32 {
        self.digest.clone().finalize()
    }
}
