//! 프로토콜 이벤트 정의
//!
//! 링크 수신 태스크, 타이머 태스크, 네트워크 계층 태스크가 만든 이벤트가
//! 단일 mpsc 채널로 모이고, 엔진 태스크 하나가 도착 순서대로 처리한다.
//! 이벤트 종류가 닫힌 enum이므로 "정의되지 않은 이벤트"는 표현 자체가 불가능하다.

use crate::frame::Frame;
use crate::seq::SeqNum;

/// 프로토콜 이벤트
#[derive(Debug, Clone)]
pub enum Event {
    /// 네트워크 계층이 크레딧과 짝지어진 송신 패킷을 준비함
    NetworkLayerReady,

    /// 프레임 도착 (디코드/CRC 검증 통과)
    FrameArrival(Frame),

    /// 체크섬 오류 프레임 수신 (내용은 버려짐)
    CksumErr,

    /// DATA 프레임 재전송 타임아웃
    Timeout(SeqNum),

    /// 지연 ACK 타임아웃 (단독 ACK을 보낼 시점)
    AckTimeout,
}
