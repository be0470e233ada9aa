//! 재시도/타임아웃 제어
//!
//! 연속된 무응답 횟수를 세다가 한도를 넘으면 종료 상태로 보낸다.
//! 응답이 오면 카운터를 0으로 되돌린다.

use std::time::Duration;

use tracing::warn;

use crate::channel::Channel;
use crate::Config;

/// `RetryController::wait` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// 제한 시간 안에 아무것도 오지 않음
    Timeout,

    /// 읽을 데이터 있음
    Ready,

    /// 재시도 한도 초과
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryController {
    count: u32,
    max_tries: u32,
    timeout: Duration,
}

impl RetryController {
    pub fn new(max_tries: u32, timeout: Duration) -> Self {
        Self {
            count: 0,
            max_tries,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_tries, config.short_timeout)
    }

    /// 현재까지의 연속 무응답 횟수
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// 한 번 대기하고 다음 상태 결정
    ///
    /// - 한도 초과: `done_state`
    /// - 데이터 도착: 카운터 리셋 후 `ready_state`
    /// - 시간 초과: `timeout_state` (카운터 유지)
    pub async fn poll<S>(
        &mut self,
        channel: &Channel,
        timeout_state: S,
        ready_state: S,
        done_state: S,
    ) -> S {
        self.count += 1;
        if self.count > self.max_tries {
            warn!(
                "{}회 연속 응답 없음, 연결 종료 (peer={})",
                self.max_tries,
                channel.peer()
            );
            return done_state;
        }

        if channel.ready(self.timeout).await {
            self.count = 0;
            ready_state
        } else {
            timeout_state
        }
    }

    pub async fn wait(&mut self, channel: &Channel) -> Wait {
        self.poll(channel, Wait::Timeout, Wait::Ready, Wait::GiveUp).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::net::UdpSocket;

    use super::*;
    use crate::channel::ErrorModel;

    #[derive(Debug, PartialEq, Eq)]
    enum Next {
        Timeout,
        Ready,
        Done,
    }

    async fn silent_channel() -> (Channel, UdpSocket) {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let channel = Channel::bind_for(peer.local_addr().unwrap(), Arc::new(ErrorModel::disabled()))
            .await
            .unwrap();
        (channel, peer)
    }

    #[tokio::test]
    async fn test_gives_up_after_max_tries() {
        let (channel, _peer) = silent_channel().await;
        let mut retry = RetryController::new(10, Duration::from_millis(5));

        for attempt in 1..=10 {
            let next = retry.poll(&channel, Next::Timeout, Next::Ready, Next::Done).await;
            assert_eq!(next, Next::Timeout, "attempt {}", attempt);
        }
        assert_eq!(retry.count(), 10);

        let next = retry.poll(&channel, Next::Timeout, Next::Ready, Next::Done).await;
        assert_eq!(next, Next::Done);
    }

    #[tokio::test]
    async fn test_response_resets_counter() {
        let (channel, peer) = silent_channel().await;
        let mut retry = RetryController::new(3, Duration::from_millis(5));

        // 한도 직전까지 타임아웃
        for _ in 0..2 {
            let next = retry.poll(&channel, Next::Timeout, Next::Ready, Next::Done).await;
            assert_eq!(next, Next::Timeout);
        }
        assert_eq!(retry.count(), 2);

        peer.send_to(b"hi", channel.local_addr().unwrap()).await.unwrap();
        retry.timeout = Duration::from_secs(1);

        assert_eq!(retry.wait(&channel).await, Wait::Ready);
        assert_eq!(retry.count(), 0);
    }
}
