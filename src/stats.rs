//! 프로토콜 통계

/// 프로토콜 동작 카운터
///
/// 엔진 태스크가 이벤트 처리마다 갱신하고, 핸들 쪽에는 스냅샷으로 공유된다.
#[derive(Debug, Clone, Default)]
pub struct ProtocolStats {
    /// 송신 DATA 프레임 수 (재전송 포함)
    pub data_frames_sent: u64,

    /// 송신 단독 ACK 프레임 수
    pub ack_frames_sent: u64,

    /// 송신 NAK 프레임 수
    pub nak_frames_sent: u64,

    /// 타임아웃에 의한 재전송 수
    pub timeout_retransmits: u64,

    /// NAK 수신에 의한 재전송 수
    pub nak_retransmits: u64,

    /// 수신 프레임 수 (CRC 통과)
    pub frames_received: u64,

    /// 수신 NAK 수
    pub naks_received: u64,

    /// 체크섬 오류 수 (디코드 실패 포함)
    pub cksum_errors: u64,

    /// 중복/윈도우 밖 DATA 폐기 수
    pub duplicates_dropped: u64,

    /// 네트워크 계층에서 가져온 패킷 수
    pub packets_pulled: u64,

    /// 네트워크 계층에 전달한 패킷 수
    pub packets_delivered: u64,

    /// 이미 확인된 시퀀스에 대한 stale 타임아웃 수
    pub stale_timeouts: u64,
}

impl ProtocolStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 총 송신 프레임 수
    pub fn frames_sent(&self) -> u64 {
        self.data_frames_sent + self.ack_frames_sent + self.nak_frames_sent
    }

    /// 재전송 비율 (재전송 / 총 DATA 송신)
    pub fn retransmit_ratio(&self) -> f64 {
        if self.data_frames_sent == 0 {
            return 0.0;
        }
        (self.timeout_retransmits + self.nak_retransmits) as f64 / self.data_frames_sent as f64
    }

    /// 요약 문자열 (시뮬레이션 출력용)
    pub fn summary(&self) -> String {
        format!(
            "sent {} (data {} / ack {} / nak {}), retx {} (timeout {} + nak {}), \
             delivered {}, cksum_err {}, dup_drop {}, stale_timeout {}",
            self.frames_sent(),
            self.data_frames_sent,
            self.ack_frames_sent,
            self.nak_frames_sent,
            self.timeout_retransmits + self.nak_retransmits,
            self.timeout_retransmits,
            self.nak_retransmits,
            self.packets_delivered,
            self.cksum_errors,
            self.duplicates_dropped,
            self.stale_timeouts,
        )
    }
}
