//! 송신/수신 윈도우 상태
//!
//! 양쪽 모두 NR_BUFS 슬롯, `seq % NR_BUFS` 인덱싱.
//! 윈도우 상태는 엔진 태스크만 접근한다.

use crate::frame::Packet;
use crate::seq::{between, inc, SeqNum};
use crate::{MAX_SEQ, NR_BUFS};

/// 송신 윈도우 (미확인 프레임 버퍼)
#[derive(Debug)]
pub struct SendWindow {
    /// 가장 오래된 미확인 시퀀스 (윈도우 하단)
    ack_expected: SeqNum,

    /// 다음에 보낼 시퀀스 (윈도우 상단, exclusive)
    next_frame_to_send: SeqNum,

    /// 슬롯별 미확인 패킷 (재전송용으로 ACK 전까지 유지)
    out_buf: Vec<Option<Packet>>,

    /// 미확인 프레임 수
    nbuffered: usize,
}

impl SendWindow {
    pub fn new() -> Self {
        Self {
            ack_expected: 0,
            next_frame_to_send: 0,
            out_buf: vec![None; NR_BUFS],
            nbuffered: 0,
        }
    }

    pub fn ack_expected(&self) -> SeqNum {
        self.ack_expected
    }

    pub fn next_frame_to_send(&self) -> SeqNum {
        self.next_frame_to_send
    }

    /// 미확인 프레임 수
    pub fn in_flight(&self) -> usize {
        self.nbuffered
    }

    /// 여유 슬롯 존재 여부
    pub fn can_send(&self) -> bool {
        self.nbuffered < NR_BUFS
    }

    /// 새 패킷을 윈도우에 넣고 할당된 시퀀스 반환
    pub fn push(&mut self, packet: Packet) -> SeqNum {
        debug_assert!(self.can_send(), "윈도우가 가득 찬 상태에서 push");

        let seq = self.next_frame_to_send;
        self.out_buf[seq as usize % NR_BUFS] = Some(packet);
        self.nbuffered += 1;
        self.next_frame_to_send = inc(seq);
        seq
    }

    /// 재전송용 패킷 조회
    pub fn packet(&self, seq: SeqNum) -> Option<&Packet> {
        self.out_buf[seq as usize % NR_BUFS].as_ref()
    }

    /// seq가 아직 미확인 상태인지
    pub fn is_outstanding(&self, seq: SeqNum) -> bool {
        between(self.ack_expected, seq, self.next_frame_to_send)
    }

    /// 누적 ACK 처리
    ///
    /// `ack`까지(포함) 확인된 시퀀스들의 슬롯을 비우고 윈도우 하단을
    /// 전진시킨다. 새로 확인된 시퀀스 목록을 반환한다 (타이머 취소용).
    /// 중복/범위 밖 ACK이면 빈 목록.
    pub fn on_ack(&mut self, ack: SeqNum) -> Vec<SeqNum> {
        let mut freed = Vec::new();
        while between(self.ack_expected, ack, self.next_frame_to_send) {
            let seq = self.ack_expected;
            self.out_buf[seq as usize % NR_BUFS] = None;
            self.nbuffered -= 1;
            self.ack_expected = inc(seq);
            freed.push(seq);
        }
        freed
    }
}

impl Default for SendWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// 수신 윈도우 (비순서 허용 수신 버퍼)
#[derive(Debug)]
pub struct RecvWindow {
    /// 다음에 기대하는 순서 시퀀스 (윈도우 하단)
    frame_expected: SeqNum,

    /// 윈도우 상단 (exclusive) = frame_expected + NR_BUFS
    too_far: SeqNum,

    /// 슬롯별 수신 패킷
    in_buf: Vec<Option<Packet>>,

    /// 슬롯별 도착 플래그
    arrived: Vec<bool>,
}

impl RecvWindow {
    pub fn new() -> Self {
        Self {
            frame_expected: 0,
            too_far: (NR_BUFS % (MAX_SEQ as usize + 1)) as SeqNum,
            in_buf: vec![None; NR_BUFS],
            arrived: vec![false; NR_BUFS],
        }
    }

    pub fn frame_expected(&self) -> SeqNum {
        self.frame_expected
    }

    pub fn too_far(&self) -> SeqNum {
        self.too_far
    }

    /// seq가 수신 윈도우 안인지
    pub fn accepts(&self, seq: SeqNum) -> bool {
        between(self.frame_expected, seq, self.too_far)
    }

    /// 윈도우 내 seq 버퍼링
    ///
    /// 윈도우 밖이거나 이미 도착한 슬롯이면 false (중복/범위 밖 폐기).
    pub fn insert(&mut self, seq: SeqNum, packet: Packet) -> bool {
        let slot = seq as usize % NR_BUFS;
        if !self.accepts(seq) || self.arrived[slot] {
            return false;
        }

        self.in_buf[slot] = Some(packet);
        self.arrived[slot] = true;
        true
    }

    /// frame_expected부터 연속 도착 구간을 순서대로 꺼내고 윈도우 전진
    pub fn take_in_order(&mut self) -> Vec<Packet> {
        let mut run = Vec::new();
        loop {
            let slot = self.frame_expected as usize % NR_BUFS;
            if !self.arrived[slot] {
                break;
            }

            // arrived 슬롯에는 항상 패킷이 있다
            if let Some(packet) = self.in_buf[slot].take() {
                run.push(packet);
            }
            self.arrived[slot] = false;
            self.frame_expected = inc(self.frame_expected);
            self.too_far = inc(self.too_far);
        }
        run
    }
}

impl Default for RecvWindow {
    fn default() -> Self {
        Self::new()
    }
}
