//! 프로토콜 설정

use std::time::Duration;

use crate::{
    Error, Result, MAX_BUFFER_SIZE, MAX_TRIES, MAX_WINDOW_SIZE, MIN_BUFFER_SIZE, MIN_WINDOW_SIZE,
};

/// 타이머/재시도/에러 주입 설정
///
/// 양쪽(송신자, 수신자) 모두 같은 구조체를 사용한다.
#[derive(Debug, Clone)]
pub struct Config {
    /// 짧은 대기 시간 (핸드쉐이크, ACK/SREJ 대기)
    pub short_timeout: Duration,

    /// 긴 대기 시간 (수신 중 데이터 대기)
    /// 이 시간 동안 아무것도 오지 않으면 송신자가 죽은 것으로 본다
    pub long_timeout: Duration,

    /// 연속 무응답 허용 횟수
    pub max_tries: u32,

    /// 송신 패킷 손상/손실 확률 (0.0 이상 1.0 미만)
    pub error_rate: f64,

    /// 에러 주입 RNG 시드 (None이면 매 실행마다 다름)
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            short_timeout: Duration::from_secs(1),
            long_timeout: Duration::from_secs(10),
            max_tries: MAX_TRIES,
            error_rate: 0.0,
            seed: None,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 손실 채널 설정
    pub fn lossy(error_rate: f64) -> Self {
        Self {
            error_rate,
            ..Self::default()
        }
    }

    /// 로컬 루프백용 설정 (짧은 타이머)
    pub fn loopback() -> Self {
        Self {
            short_timeout: Duration::from_millis(100),
            long_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// 시드 지정
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 에러율 지정
    pub fn with_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate;
        self
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.error_rate) {
            return Err(Error::InvalidErrorRate(self.error_rate));
        }
        Ok(())
    }
}

/// 협상 대상 전송 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferParams {
    /// 윈도우 크기 (pane 개수)
    pub window_size: u32,

    /// 패킷당 페이로드 크기 (바이트)
    pub buffer_size: u32,
}

impl TransferParams {
    /// 검증된 파라미터 생성
    pub fn new(window_size: u32, buffer_size: u32) -> Result<Self> {
        let params = Self {
            window_size,
            buffer_size,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&self.window_size) {
            return Err(Error::InvalidWindowSize(self.window_size));
        }
        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&self.buffer_size) {
            return Err(Error::InvalidBufferSize(self.buffer_size));
        }
        Ok(())
    }
}

impl Default for TransferParams {
    fn default() -> Self {
        Self {
            window_size: 10,
            buffer_size: MAX_BUFFER_SIZE,
        }
    }
}
