//! 프로토콜 설정

use crate::link::LinkConfig;
use crate::{DEFAULT_ACK_TIMEOUT_MS, DEFAULT_DATA_TIMEOUT_MS};

/// SWP 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// DATA 재전송 타임아웃 (밀리초)
    pub data_timeout_ms: u64,

    /// 지연 ACK 타임아웃 (밀리초)
    /// DATA 타임아웃보다 짧아야 상대 재전송 전에 단독 ACK이 나간다
    pub ack_timeout_ms: u64,

    /// 이벤트 채널 용량
    pub event_channel_capacity: usize,

    /// 전달/제출 패킷 채널 용량
    pub packet_channel_capacity: usize,

    /// 링크 프레임 손실률 (0.0 ~ 1.0)
    pub loss_rate: f64,

    /// 링크 프레임 변조율 (0.0 ~ 1.0)
    pub corrupt_rate: f64,

    /// 링크 채널 용량 (프레임 수)
    pub link_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_timeout_ms: DEFAULT_DATA_TIMEOUT_MS,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            event_channel_capacity: 256,
            packet_channel_capacity: 64,
            loss_rate: 0.0,               // 무손실 링크 (기본)
            corrupt_rate: 0.0,
            link_capacity: 256,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 손실/변조 링크용 설정
    pub fn lossy() -> Self {
        Self {
            loss_rate: 0.10,              // 10% 손실
            corrupt_rate: 0.05,           // 5% 변조
            ..Self::default()
        }
    }

    /// 짧은 타이머 설정 (시뮬레이션/테스트용)
    pub fn fast() -> Self {
        Self {
            data_timeout_ms: 40,
            ack_timeout_ms: 20,
            ..Self::default()
        }
    }

    /// 링크 시뮬레이션 파라미터 추출
    pub fn link(&self) -> LinkConfig {
        LinkConfig {
            loss_rate: self.loss_rate,
            corrupt_rate: self.corrupt_rate,
            capacity: self.link_capacity,
        }
    }
}
