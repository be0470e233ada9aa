//! 에러 타입 정의

use thiserror::Error;

/// SREJ 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("페이로드 크기 초과: {len} > {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("체크섬 오류 (CRC_ERROR)")]
    Corrupt,

    #[error("패킷이 너무 짧음: {len} bytes")]
    Truncated { len: usize },

    #[error("알 수 없는 플래그: {0}")]
    UnknownFlag(u8),

    #[error("유효하지 않은 윈도우 크기: {0} (허용 범위 1~229)")]
    InvalidWindowSize(u32),

    #[error("유효하지 않은 버퍼 크기: {0} (허용 범위 400~1400)")]
    InvalidBufferSize(u32),

    #[error("유효하지 않은 에러율: {0} (허용 범위 0 이상 1 미만)")]
    InvalidErrorRate(f64),

    #[error("유효하지 않은 파일명: {reason}")]
    InvalidFilename { reason: &'static str },

    #[error("윈도우가 닫혀 있음: lower={lower}, current={current}")]
    WindowClosed { lower: u32, current: u32 },

    #[error("순서가 맞지 않는 pane: expected {expected}, got {got}")]
    OutOfOrderPane { expected: u32, got: u32 },

    #[error("슬롯이 아직 사용 중: seq={seq_num}")]
    SlotOccupied { seq_num: u32 },

    #[error("pane 없음: seq={seq_num}")]
    PaneNotFound { seq_num: u32 },

    #[error("유효하지 않은 슬라이드: lower={lower}, new_lower={new_lower}, current={current}")]
    InvalidSlide {
        lower: u32,
        new_lower: u32,
        current: u32,
    },

    #[error("수신 윈도우 범위 밖: seq={seq_num}, 범위 [{low}, {high})")]
    OutOfWindow { seq_num: u32, low: u32, high: u32 },

    #[error("파일을 찾을 수 없음: {0}")]
    FileNotFound(String),

    #[error("상대방 응답 없음 ({tries}회 재시도 후 종료)")]
    PeerUnreachable { tries: u32 },

    #[error("수신 대기 시간 초과 ({secs}초 동안 패킷 없음)")]
    RecvTimeout { secs: u64 },

    #[error("주소 변환 실패: {0}")]
    AddrResolution(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
