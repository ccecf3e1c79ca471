//! 에러 타입 정의

use thiserror::Error;

/// SWP 프로토콜 에러 타입
///
/// 프로토콜 수준 장애(손실, 변조, 중복)는 에러가 아니라 이벤트로 복구된다.
/// 여기의 에러는 수신 프레임 검증 실패와, 협력자 채널이 끊어지는
/// 계약 위반에만 쓰인다.
#[derive(Error, Debug)]
pub enum Error {
    #[error("CRC 불일치: expected {expected:08X}, got {got:08X}")]
    CrcMismatch { expected: u32, got: u32 },

    #[error("링크 채널 종료")]
    LinkClosed,

    #[error("네트워크 계층 채널 종료")]
    NetworkLayerClosed,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
