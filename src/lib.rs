//! # SREJ
//!
//! 손실 UDP 위에서 동작하는 Selective-Reject 슬라이딩 윈도우 파일 전송
//!
//! ## 핵심 특징
//! - **누적 ACK**: ACK(N) = N까지 모두 기록됨
//! - **선택적 재전송**: SREJ(N) = 정확히 N 하나만 다시 요청
//! - **체크섬**: 16비트 1의 보수 인터넷 체크섬으로 손상 패킷 폐기
//! - **에러 주입**: 송신 경로에서 드롭/비트 반전
//! - **전송별 태스크**: 서버는 요청마다 독립 태스크와 소켓으로 응답

pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod message;
pub mod packet;
pub mod receiver;
pub mod retry;
pub mod sender;
pub mod server;
pub mod stats;
pub mod window;

pub use buffer::{AddOutcome, ReceiverBuffer};
pub use channel::{Channel, ErrorModel, Fault};
pub use config::{Config, TransferParams};
pub use error::{Error, Result};
pub use message::FilenameRequest;
pub use packet::{Flag, Packet};
pub use receiver::{receive_file, ReceiveRequest};
pub use retry::RetryController;
pub use sender::serve_transfer;
pub use server::Server;
pub use stats::TransferStats;
pub use window::{Pane, SenderWindow};

/// DATA 페이로드 최대 크기 (바이트)
pub const MAX_PAYLOAD_SIZE: usize = 1400;

/// 윈도우 크기 범위 (패킷 수)
pub const MIN_WINDOW_SIZE: u32 = 1;
pub const MAX_WINDOW_SIZE: u32 = 229;

/// 버퍼(DATA 페이로드) 크기 범위 (바이트)
pub const MIN_BUFFER_SIZE: u32 = 400;
pub const MAX_BUFFER_SIZE: u32 = 1400;

/// 파일명 최대 길이 (바이트)
pub const MAX_FILENAME_LEN: usize = 100;

/// 첫 DATA 패킷 seq
pub const START_SEQ_NUM: u32 = 1;

/// 연속 무응답 허용 횟수
pub const MAX_TRIES: u32 = 10;
