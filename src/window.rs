//! 송신 윈도우
//!
//! 아직 ACK되지 않은 DATA 패킷을 `seq_num % size` 슬롯의 원형 버퍼에 보관한다.
//!
//! ```text
//!   lower                 current
//!     │                      │
//! ────┼──────────────────────┼──────────▶ seq
//!     │ <── 전송 후 대기 ──▶ │ <── 전송 가능 ──▶
//! ```
//!
//! 불변식: `current - lower <= size`. 슬롯은 ACK 표시가 된 뒤에만 재사용된다.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::channel::Channel;
use crate::packet::{Flag, HEADER_LEN};
use crate::{Error, Result, MAX_WINDOW_SIZE, START_SEQ_NUM};

/// 윈도우 한 칸 (전송 후 ACK 대기 중인 패킷 하나)
#[derive(Debug, Clone)]
pub struct Pane {
    pub seq_num: u32,
    pub payload: Bytes,
    pub acked: bool,
}

impl Pane {
    /// 빈 슬롯. ACK 상태로 두어 바로 사용할 수 있게 한다.
    fn vacant() -> Self {
        Self {
            seq_num: 0,
            payload: Bytes::new(),
            acked: true,
        }
    }

    /// 헤더 포함 패킷 길이
    pub fn packet_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

/// 송신 측 슬라이딩 윈도우
#[derive(Debug)]
pub struct SenderWindow {
    size: u32,
    lower: u32,
    current: u32,
    panes: Vec<Pane>,
}

impl SenderWindow {
    pub fn new(size: u32) -> Result<Self> {
        if size == 0 || size > MAX_WINDOW_SIZE {
            return Err(Error::InvalidWindowSize(size));
        }
        Ok(Self {
            size,
            lower: START_SEQ_NUM,
            current: START_SEQ_NUM,
            panes: (0..size).map(|_| Pane::vacant()).collect(),
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// 가장 오래된 미확인 seq
    pub fn lower(&self) -> u32 {
        self.lower
    }

    /// 다음에 할당할 seq
    pub fn current(&self) -> u32 {
        self.current
    }

    /// 전송 후 ACK 대기 중인 패킷 수 (이미 ACK됐지만 아직 밀리지 않은 것 포함)
    pub fn in_flight(&self) -> u32 {
        self.current - self.lower
    }

    fn slot(&self, seq_num: u32) -> usize {
        (seq_num % self.size) as usize
    }

    fn contains(&self, seq_num: u32) -> bool {
        (self.lower..self.current).contains(&seq_num)
    }

    /// 새 pane을 추가할 수 있는지
    pub fn is_open(&self) -> bool {
        self.in_flight() < self.size && self.panes[self.slot(self.current)].acked
    }

    /// `current` 위치에 pane 추가
    pub fn add_pane(&mut self, payload: Bytes, seq_num: u32) -> Result<()> {
        if seq_num != self.current {
            return Err(Error::OutOfOrderPane {
                expected: self.current,
                got: seq_num,
            });
        }
        if self.in_flight() >= self.size {
            return Err(Error::WindowClosed {
                lower: self.lower,
                current: self.current,
            });
        }

        let idx = self.slot(seq_num);
        if !self.panes[idx].acked {
            return Err(Error::SlotOccupied { seq_num });
        }

        self.panes[idx] = Pane {
            seq_num,
            payload,
            acked: false,
        };
        self.current += 1;

        debug_assert!(self.in_flight() <= self.size);
        trace!("pane 추가: seq={} slot={}", seq_num, idx);
        Ok(())
    }

    /// 단일 pane ACK 표시
    ///
    /// 늦게 도착한 ACK는 `PaneNotFound`가 되며 호출자가 무시하면 된다.
    pub fn mark_ack(&mut self, seq_num: u32) -> Result<()> {
        let idx = self.slot(seq_num);
        if !self.contains(seq_num) || self.panes[idx].seq_num != seq_num {
            return Err(Error::PaneNotFound { seq_num });
        }
        self.panes[idx].acked = true;
        Ok(())
    }

    /// `[lower, new_lower)` 구간을 비우고 하한을 이동
    ///
    /// 구간 안의 모든 pane이 ACK된 상태여야 한다.
    pub fn slide(&mut self, new_lower: u32) -> Result<()> {
        let invalid = Error::InvalidSlide {
            lower: self.lower,
            new_lower,
            current: self.current,
        };
        if new_lower < self.lower || new_lower > self.current {
            return Err(invalid);
        }
        if (self.lower..new_lower).any(|seq| !self.panes[self.slot(seq)].acked) {
            return Err(invalid);
        }

        for seq in self.lower..new_lower {
            let idx = self.slot(seq);
            // ACK 표시는 남겨 두어 add_pane이 재사용할 수 있게 함
            self.panes[idx].payload = Bytes::new();
        }

        trace!("윈도우 이동: {} -> {}", self.lower, new_lower);
        self.lower = new_lower;
        debug_assert!(self.in_flight() <= self.size);
        Ok(())
    }

    /// 누적 ACK 처리: `ack_num`까지 모두 ACK 표시 후 그 다음으로 이동
    ///
    /// 새로 확인된 pane 수를 반환. 이미 지나간 ACK면 0.
    pub fn ack_through(&mut self, ack_num: u32) -> Result<u32> {
        if ack_num < self.lower {
            return Ok(0);
        }
        if ack_num >= self.current {
            return Err(Error::PaneNotFound { seq_num: ack_num });
        }

        for seq in self.lower..=ack_num {
            self.mark_ack(seq)?;
        }
        let newly_acked = ack_num + 1 - self.lower;
        self.slide(ack_num + 1)?;
        Ok(newly_acked)
    }

    pub fn pane(&self, seq_num: u32) -> Option<&Pane> {
        let pane = &self.panes[self.slot(seq_num)];
        (self.contains(seq_num) && pane.seq_num == seq_num).then_some(pane)
    }

    /// 가장 오래된 미확인 pane의 seq
    pub fn oldest_unacked(&self) -> Option<u32> {
        (self.lower..self.current).find(|&seq| !self.panes[self.slot(seq)].acked)
    }

    /// 모든 전송 패킷이 확인되었는지
    pub fn all_acked(&self) -> bool {
        self.oldest_unacked().is_none()
    }

    /// 보관 중인 pane을 주어진 플래그로 다시 프레이밍해서 재전송
    ///
    /// `flag`는 SREJ_DATA / TIMEOUT_DATA 구분용.
    pub async fn resend(&self, seq_num: u32, flag: Flag, channel: &mut Channel) -> Result<usize> {
        let pane = self
            .pane(seq_num)
            .filter(|pane| !pane.acked)
            .ok_or(Error::PaneNotFound { seq_num })?;

        debug!("재전송: seq={} flag={:?} len={}", seq_num, flag, pane.packet_len());
        channel.send_packet(&pane.payload, flag, seq_num).await
    }
}
