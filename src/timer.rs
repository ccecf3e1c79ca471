//! 타이머 관리
//!
//! - DATA 프레임별 재전송 타이머 (슬롯 = seq % NR_BUFS, 슬롯당 최대 1개)
//! - 지연 ACK 싱글톤 타이머
//!
//! 타이머 만료는 엔진 상태를 직접 건드리지 않고 이벤트 채널로
//! Timeout / AckTimeout을 넣는다. abort와 만료가 경합해 stale
//! Timeout이 도착할 수 있으며, 엔진이 윈도우 멤버십을 재확인해 걸러낸다.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::event::Event;
use crate::seq::SeqNum;
use crate::NR_BUFS;

/// 재전송/지연 ACK 타이머 관리자
pub struct TimerManager {
    event_tx: mpsc::Sender<Event>,
    data_timeout: Duration,
    ack_timeout: Duration,
    data_timers: Vec<Option<JoinHandle<()>>>,
    ack_timer: Option<JoinHandle<()>>,
}

impl TimerManager {
    pub fn new(
        event_tx: mpsc::Sender<Event>,
        data_timeout: Duration,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            event_tx,
            data_timeout,
            ack_timeout,
            data_timers: (0..NR_BUFS).map(|_| None).collect(),
            ack_timer: None,
        }
    }

    /// seq용 재전송 타이머 시작
    ///
    /// 같은 슬롯의 기존 타이머는 먼저 취소된다 (슬롯당 최대 1개 유지).
    pub fn start_data_timer(&mut self, seq: SeqNum) {
        self.stop_data_timer(seq);

        let tx = self.event_tx.clone();
        let timeout = self.data_timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Event::Timeout(seq)).await;
        });

        self.data_timers[seq as usize % NR_BUFS] = Some(handle);
        trace!("DATA 타이머 시작: seq={}", seq);
    }

    /// seq 슬롯의 타이머 취소 (없으면 no-op)
    pub fn stop_data_timer(&mut self, seq: SeqNum) {
        if let Some(handle) = self.data_timers[seq as usize % NR_BUFS].take() {
            handle.abort();
            trace!("DATA 타이머 취소: seq={}", seq);
        }
    }

    /// seq 슬롯에 타이머가 걸려 있는지
    pub fn data_timer_armed(&self, seq: SeqNum) -> bool {
        self.data_timers[seq as usize % NR_BUFS].is_some()
    }

    /// 지연 ACK 타이머 시작 (기존 타이머는 취소)
    pub fn start_ack_timer(&mut self) {
        self.stop_ack_timer();

        let tx = self.event_tx.clone();
        let timeout = self.ack_timeout;
        self.ack_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Event::AckTimeout).await;
        }));
    }

    /// 지연 ACK 타이머 취소 (없으면 no-op)
    pub fn stop_ack_timer(&mut self) {
        if let Some(handle) = self.ack_timer.take() {
            handle.abort();
        }
    }

    /// 종료 시 전체 타이머 취소
    pub fn stop_all(&mut self) {
        for slot in self.data_timers.iter_mut() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        self.stop_ack_timer();
    }
}
