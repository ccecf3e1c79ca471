//! # SWP (Sliding Window Protocol)
//!
//! Selective-repeat 방식 슬라이딩 윈도우 ARQ 프로토콜 엔진
//!
//! ## 핵심 특징
//! - **Selective repeat**: 타임아웃 시 누락된 프레임 하나만 재전송
//! - **Piggyback ACK**: 모든 송신 프레임에 누적 ACK 동봉
//! - **NAK**: 갭 감지 시 오류 구간당 1회만 재전송 요청 (`no_nak` 게이트)
//! - **이중 타이머**: 프레임별 재전송 타이머 + 지연 ACK 싱글톤 타이머
//! - **단일 소비자 이벤트 루프**: 윈도우/타이머 상태는 엔진 태스크만 접근
//! - **링크 시뮬레이션**: in-process 채널 쌍으로 손실/변조 링크 재현

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod frame;
pub mod link;
pub mod network;
pub mod seq;
pub mod stats;
pub mod timer;
pub mod window;

pub use config::Config;
pub use engine::{Engine, EngineHandle};
pub use error::{Error, Result};
pub use event::Event;
pub use frame::{Frame, FrameKind, Packet};
pub use link::{LinkConfig, LinkPort};
pub use network::{DeliveredReceiver, NetworkClient, NetworkLayer};
pub use seq::{between, inc, SeqNum};
pub use stats::ProtocolStats;
pub use timer::TimerManager;
pub use window::{RecvWindow, SendWindow};

/// 최대 시퀀스 번호 (홀수여야 윈도우가 시퀀스 공간의 절반을 넘지 않음)
pub const MAX_SEQ: u8 = 7;

/// 윈도우 크기 = 시퀀스 공간의 절반
pub const NR_BUFS: usize = (MAX_SEQ as usize + 1) / 2;

/// 기본 DATA 재전송 타임아웃 (밀리초)
pub const DEFAULT_DATA_TIMEOUT_MS: u64 = 500;

/// 기본 지연 ACK 타임아웃 (밀리초, DATA 타임아웃보다 짧아야 함)
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 300;
