//! 전송 통계

use std::time::{Duration, Instant};

/// 한 번의 파일 전송에 대한 통계
///
/// 송신/수신 양쪽이 같은 구조체를 쓰고, 해당 쪽에서 의미 없는 카운터는 0으로 남는다.
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 종료 시간 (진행 중이면 None)
    pub end_time: Option<Instant>,

    /// 총 송신 패킷 수 (제어 패킷 포함, 주입 드롭 포함)
    pub packets_sent: u64,

    /// 최초 전송 DATA 패킷 수
    pub data_packets: u64,

    /// SREJ 요청에 의한 재전송 수
    pub srej_retransmits: u64,

    /// 타임아웃에 의한 재전송 수
    pub timeout_retransmits: u64,

    /// 보낸 ACK 수
    pub acks_sent: u64,

    /// 보낸 SREJ 수
    pub srejs_sent: u64,

    /// 받은 ACK 수
    pub acks_received: u64,

    /// 받은 SREJ 수
    pub srejs_received: u64,

    /// 체크섬 오류로 버린 패킷 수
    pub corrupt_packets: u64,

    /// 중복 수신 패킷 수
    pub duplicate_packets: u64,

    /// 에러 주입으로 버려진 패킷 수
    pub injected_drops: u64,

    /// 에러 주입으로 손상된 패킷 수
    pub injected_flips: u64,

    /// 전송/기록한 파일 데이터 바이트
    pub payload_bytes: u64,

    /// 파일 데이터 CRC32
    pub digest: u32,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            end_time: None,
            packets_sent: 0,
            data_packets: 0,
            srej_retransmits: 0,
            timeout_retransmits: 0,
            acks_sent: 0,
            srejs_sent: 0,
            acks_received: 0,
            srejs_received: 0,
            corrupt_packets: 0,
            duplicate_packets: 0,
            injected_drops: 0,
            injected_flips: 0,
            payload_bytes: 0,
            digest: 0,
        }
    }

    /// 종료 시각 기록
    pub fn finish(&mut self) {
        self.end_time.get_or_insert_with(Instant::now);
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// 재전송 총합
    pub fn retransmits(&self) -> u64 {
        self.srej_retransmits + self.timeout_retransmits
    }

    /// 파일 데이터 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.payload_bytes as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Bytes: {} | Throughput: {:.2} KB/s | Sent: {} (data {}, srej-re {}, timeout-re {}) | ACK/SREJ out: {}/{} in: {}/{} | Corrupt: {} | Dup: {} | Injected drop/flip: {}/{} | CRC32: {:08x}",
            self.elapsed().as_secs_f64(),
            self.payload_bytes,
            self.throughput() / 1_000.0,
            self.packets_sent,
            self.data_packets,
            self.srej_retransmits,
            self.timeout_retransmits,
            self.acks_sent,
            self.srejs_sent,
            self.acks_received,
            self.srejs_received,
            self.corrupt_packets,
            self.duplicate_packets,
            self.injected_drops,
            self.injected_flips,
            self.digest,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_freezes_after_finish() {
        let mut stats = TransferStats::new();
        stats.finish();
        let first = stats.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(stats.elapsed(), first);
    }

    #[test]
    fn test_summary_includes_counters() {
        let mut stats = TransferStats::new();
        stats.srej_retransmits = 3;
        stats.timeout_retransmits = 2;
        stats.digest = 0xdeadbeef;

        assert_eq!(stats.retransmits(), 5);
        let summary = stats.summary();
        assert!(summary.contains("srej-re 3"));
        assert!(summary.contains("deadbeef"));
    }
}
