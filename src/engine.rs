//! 프로토콜 엔진
//!
//! 다섯 가지 이벤트를 단일 태스크에서 도착 순서대로 처리하는 상태 기계.
//! 송신/수신 윈도우, 타이머, `no_nak` 플래그는 이 태스크만 접근하므로
//! 락 없이도 이벤트 처리의 직렬성이 보장된다. 타이머와 링크 수신은
//! 이벤트를 채널에 넣을 뿐 상태를 직접 건드리지 않는다.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::Result;
use crate::event::Event;
use crate::frame::{Frame, FrameKind};
use crate::link::{LinkPort, LinkSender};
use crate::network::{DeliveredReceiver, NetworkClient, NetworkLayer};
use crate::seq::{inc, SeqNum};
use crate::stats::ProtocolStats;
use crate::timer::TimerManager;
use crate::window::{RecvWindow, SendWindow};
use crate::{MAX_SEQ, NR_BUFS};

/// 엔진 내부 상태 (엔진 태스크 전용)
struct EngineInner {
    send_window: SendWindow,
    recv_window: RecvWindow,
    timers: TimerManager,

    /// 현재 오류 구간에서 아직 NAK을 보내지 않았는지
    /// (순서 맞은 전달 시에만 true로 리셋된다)
    no_nak: bool,

    link_tx: LinkSender,
    network: NetworkLayer,
    stats: ProtocolStats,
}

impl EngineInner {
    async fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::NetworkLayerReady => self.on_network_layer_ready().await,
            Event::FrameArrival(frame) => self.on_frame_arrival(frame).await,
            Event::CksumErr => self.on_cksum_err().await,
            Event::Timeout(seq) => self.on_timeout(seq).await,
            Event::AckTimeout => self.on_ack_timeout().await,
        }
    }

    /// 네트워크 계층이 패킷을 준비함: 윈도우에 넣고 DATA 송신
    async fn on_network_layer_ready(&mut self) -> Result<()> {
        if !self.send_window.can_send() {
            // 크레딧 회계가 맞으면 도달하지 않는다
            warn!("윈도우가 가득 찬 상태의 NetworkLayerReady, 무시");
            return Ok(());
        }

        let packet = self.network.next_outgoing_packet().await?;
        self.stats.packets_pulled += 1;

        let seq = self.send_window.push(packet);
        self.send_frame(FrameKind::Data, seq).await
    }

    /// 프레임 도착: DATA 수신 처리 + 모든 프레임의 piggyback ACK 처리
    async fn on_frame_arrival(&mut self, frame: Frame) -> Result<()> {
        self.stats.frames_received += 1;

        if frame.kind == FrameKind::Data {
            let frame_expected = self.recv_window.frame_expected();

            // 순서가 어긋난 첫 프레임에만 NAK, 그 외에는 지연 ACK 예약
            if frame.seq != frame_expected && self.no_nak {
                self.send_frame(FrameKind::Nak, 0).await?;
            } else {
                self.timers.start_ack_timer();
            }

            let payload = frame.payload.clone().unwrap_or_default();
            if self.recv_window.insert(frame.seq, payload) {
                trace!("DATA 버퍼링: seq={} (expected={})", frame.seq, frame_expected);
            } else {
                // 중복이거나 윈도우 밖: 폐기하고 지연 ACK으로 누적 지점만 재광고
                self.stats.duplicates_dropped += 1;
                trace!("DATA 폐기: seq={} (expected={})", frame.seq, frame_expected);
            }

            // frame_expected부터 이어진 연속 구간을 순서대로 전달
            for packet in self.recv_window.take_in_order() {
                self.no_nak = true;
                self.stats.packets_delivered += 1;
                self.network.deliver(packet).await?;
                self.timers.start_ack_timer();
            }
        }

        // NAK 수신: 상대가 기다리는 프레임(ack 다음)을 즉시 재전송
        if frame.kind == FrameKind::Nak {
            self.stats.naks_received += 1;
            let resend = inc(frame.ack);
            if self.send_window.is_outstanding(resend) {
                debug!("NAK 수신, 재전송: seq={}", resend);
                self.stats.nak_retransmits += 1;
                self.send_frame(FrameKind::Data, resend).await?;
            }
        }

        // 모든 프레임의 piggyback ACK을 누적 처리:
        // 확인된 슬롯마다 타이머를 끄고 크레딧 1을 돌려준다
        for seq in self.send_window.on_ack(frame.ack) {
            self.timers.stop_data_timer(seq);
            self.network.grant_credit(1).await?;
        }
        Ok(())
    }

    /// 체크섬 오류: 오류 구간당 한 번만 NAK
    async fn on_cksum_err(&mut self) -> Result<()> {
        self.stats.cksum_errors += 1;
        if self.no_nak {
            self.send_frame(FrameKind::Nak, 0).await?;
        }
        Ok(())
    }

    /// 재전송 타임아웃: 해당 프레임 하나만 재전송 (selective repeat)
    async fn on_timeout(&mut self, seq: SeqNum) -> Result<()> {
        if !self.send_window.is_outstanding(seq) {
            // 취소와 만료가 경합한 stale 타임아웃: no-op
            self.stats.stale_timeouts += 1;
            debug!("stale 타임아웃 무시: seq={}", seq);
            return Ok(());
        }

        debug!("타임아웃 재전송: seq={}", seq);
        self.stats.timeout_retransmits += 1;
        self.send_frame(FrameKind::Data, seq).await
    }

    /// 지연 ACK 만료: piggyback 기회가 없었으므로 단독 ACK 송신
    async fn on_ack_timeout(&mut self) -> Result<()> {
        trace!("지연 ACK 만료, 단독 ACK 송신");
        self.send_frame(FrameKind::Ack, 0).await
    }

    /// 프레임 생성/송신
    ///
    /// 모든 프레임은 현재 누적 ACK(`frame_expected - 1`)을 동봉하고,
    /// 송신 후 지연 ACK 타이머를 끈다 (단독 ACK이 불필요해짐).
    /// DATA면 송신 직후 해당 시퀀스의 재전송 타이머를 건다.
    async fn send_frame(&mut self, kind: FrameKind, frame_no: SeqNum) -> Result<()> {
        let ack = (self.recv_window.frame_expected() + MAX_SEQ) % (MAX_SEQ + 1);

        let frame = match kind {
            FrameKind::Data => {
                // 윈도우 슬롯의 패킷은 ACK 전까지 유지된다
                let payload = self
                    .send_window
                    .packet(frame_no)
                    .cloned()
                    .unwrap_or_default();
                self.stats.data_frames_sent += 1;
                Frame::data(frame_no, ack, payload)
            }
            FrameKind::Ack => {
                self.stats.ack_frames_sent += 1;
                Frame::ack(ack)
            }
            FrameKind::Nak => {
                // 오류 구간당 NAK 1회
                self.no_nak = false;
                self.stats.nak_frames_sent += 1;
                Frame::nak(ack)
            }
        };

        trace!(
            "프레임 송신: kind={:?} seq={} ack={}",
            frame.kind,
            frame.seq,
            frame.ack
        );
        self.link_tx.transmit(&frame).await?;

        if kind == FrameKind::Data {
            self.timers.start_data_timer(frame_no);
        }
        self.timers.stop_ack_timer();
        Ok(())
    }
}

/// 엔진 핸들 (외부 제어용)
pub struct EngineHandle {
    shutdown_tx: watch::Sender<bool>,
    stats: Arc<RwLock<ProtocolStats>>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// 정지 요청 (이벤트 루프의 유일한 대기 지점에서 확인된다)
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// 현재 통계 스냅샷
    pub fn stats(&self) -> ProtocolStats {
        self.stats.read().clone()
    }

    /// 엔진 태스크 종료 대기
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// 프로토콜 엔진 진입점
pub struct Engine;

impl Engine {
    /// 스테이션 하나 시작
    ///
    /// 링크 포트 하나를 받아 수신 태스크, 네트워크 계층 태스크,
    /// 엔진 이벤트 루프를 띄운다.
    pub fn start(
        config: Config,
        port: LinkPort,
    ) -> (EngineHandle, NetworkClient, DeliveredReceiver) {
        let (event_tx, mut event_rx) = mpsc::channel::<Event>(config.event_channel_capacity);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let LinkPort {
            sender: link_tx,
            receiver: link_rx,
        } = port;
        let arrival_task = link_rx.spawn_arrival_task(event_tx.clone());

        let (network, client, delivered_rx) =
            NetworkLayer::spawn(event_tx.clone(), config.packet_channel_capacity);

        let timers = TimerManager::new(
            event_tx,
            Duration::from_millis(config.data_timeout_ms),
            Duration::from_millis(config.ack_timeout_ms),
        );

        let stats = Arc::new(RwLock::new(ProtocolStats::new()));
        let stats_shared = stats.clone();

        let mut inner = EngineInner {
            send_window: SendWindow::new(),
            recv_window: RecvWindow::new(),
            timers,
            no_nak: true,
            link_tx,
            network,
            stats: ProtocolStats::new(),
        };

        let task = tokio::spawn(async move {
            // 시작 크레딧: 윈도우 전체
            if inner.network.grant_credit(NR_BUFS).await.is_err() {
                return;
            }
            info!("SWP 엔진 시작 (윈도우 {} 슬롯)", NR_BUFS);

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("엔진 종료 요청");
                            break;
                        }
                    }
                    event = event_rx.recv() => match event {
                        Some(event) => {
                            if let Err(e) = inner.handle_event(event).await {
                                warn!("협력자 채널 종료, 엔진 정지: {}", e);
                                break;
                            }
                            *stats_shared.write() = inner.stats.clone();
                        }
                        None => break, // 모든 이벤트 소스 종료
                    },
                }
            }

            inner.timers.stop_all();
            arrival_task.abort();
        });

        (
            EngineHandle {
                shutdown_tx,
                stats,
                task,
            },
            client,
            delivered_rx,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Packet;
    use crate::link::LinkConfig;
    use bytes::Bytes;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    /// 이벤트를 수동 주입할 수 있는 inner + 상대편 링크 포트 구성
    ///
    /// 타이머는 충분히 길게 잡아 테스트 중 저절로 발화하지 않는다.
    fn manual_inner() -> (
        EngineInner,
        mpsc::Receiver<Event>,
        NetworkClient,
        DeliveredReceiver,
        LinkPort,
    ) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (peer, port) = LinkPort::pair(LinkConfig::default());
        let (network, client, delivered_rx) = NetworkLayer::spawn(event_tx.clone(), 64);

        let inner = EngineInner {
            send_window: SendWindow::new(),
            recv_window: RecvWindow::new(),
            timers: TimerManager::new(
                event_tx,
                Duration::from_secs(60),
                Duration::from_secs(60),
            ),
            no_nak: true,
            link_tx: port.sender,
            network,
            stats: ProtocolStats::new(),
        };

        (inner, event_rx, client, delivered_rx, peer)
    }

    async fn recv_frame(peer: &mut LinkPort) -> Frame {
        let bytes = timeout(WAIT, peer.receiver.recv())
            .await
            .expect("프레임 수신 타임아웃")
            .expect("링크 종료");
        Frame::from_bytes(&bytes).expect("프레임 디코드 실패")
    }

    #[tokio::test]
    async fn lossless_duplex_delivers_in_order_exactly_once() {
        let config = Config::fast();
        let (port_a, port_b) = LinkPort::pair(config.link());
        let (a, a_client, mut a_delivered) = Engine::start(config.clone(), port_a);
        let (b, b_client, mut b_delivered) = Engine::start(config, port_b);

        let count = 12usize;
        for i in 0..count {
            a_client.submit(Bytes::from(format!("a-{i}"))).await.unwrap();
            b_client.submit(Bytes::from(format!("b-{i}"))).await.unwrap();
        }

        let mut at_b: Vec<Packet> = Vec::new();
        while at_b.len() < count {
            let p = timeout(WAIT, b_delivered.recv())
                .await
                .expect("B 전달 타임아웃")
                .expect("B 채널 종료");
            at_b.push(p);
        }
        let mut at_a: Vec<Packet> = Vec::new();
        while at_a.len() < count {
            let p = timeout(WAIT, a_delivered.recv())
                .await
                .expect("A 전달 타임아웃")
                .expect("A 채널 종료");
            at_a.push(p);
        }

        // 제출 순서 그대로, 정확히 한 번씩
        for (i, p) in at_b.iter().enumerate() {
            assert_eq!(p.as_ref(), format!("a-{i}").as_bytes());
        }
        for (i, p) in at_a.iter().enumerate() {
            assert_eq!(p.as_ref(), format!("b-{i}").as_bytes());
        }

        // 무손실이므로 추가 전달이 나와서는 안 된다
        assert!(timeout(Duration::from_millis(200), b_delivered.recv())
            .await
            .is_err());

        assert_eq!(a.stats().packets_delivered, count as u64);
        assert_eq!(b.stats().packets_delivered, count as u64);
        a.stop();
        b.stop();
        a.join().await;
        b.join().await;
    }

    #[tokio::test]
    async fn lossy_link_recovers_all_packets() {
        let mut config = Config::fast();
        config.loss_rate = 0.15;
        config.corrupt_rate = 0.05;

        let (port_a, port_b) = LinkPort::pair(config.link());
        let (a, a_client, _a_delivered) = Engine::start(config.clone(), port_a);
        let (b, _b_client, mut b_delivered) = Engine::start(config, port_b);

        let count = 30usize;
        for i in 0..count {
            a_client
                .submit(Bytes::from(format!("pkt-{i}")))
                .await
                .unwrap();
        }

        for i in 0..count {
            let p = timeout(Duration::from_secs(30), b_delivered.recv())
                .await
                .expect("손실 링크 복구 타임아웃")
                .expect("채널 종료");
            assert_eq!(p.as_ref(), format!("pkt-{i}").as_bytes());
        }

        a.stop();
        b.stop();
        a.join().await;
        b.join().await;
    }

    #[tokio::test]
    async fn out_of_order_arrival_triggers_single_nak() {
        let config = Config::fast();
        let (mut peer, engine_port) = LinkPort::pair(config.link());
        let (engine, _client, mut delivered) = Engine::start(config, engine_port);

        // seq 0이 유실되었다고 가정하고 seq 1을 먼저 보낸다
        peer.sender
            .transmit(&Frame::data(1, 7, Bytes::from_static(b"one")))
            .await
            .unwrap();

        // 엔진은 NAK 하나를 보낸다 (ack = frame_expected - 1 = 7)
        let nak = loop {
            let f = recv_frame(&mut peer).await;
            if f.kind == FrameKind::Nak {
                break f;
            }
        };
        assert_eq!(nak.ack, 7);

        // seq 0 재전송: 0, 1이 순서대로 전달된다
        peer.sender
            .transmit(&Frame::data(0, 7, Bytes::from_static(b"zero")))
            .await
            .unwrap();

        let p0 = timeout(WAIT, delivered.recv()).await.unwrap().unwrap();
        let p1 = timeout(WAIT, delivered.recv()).await.unwrap().unwrap();
        assert_eq!(p0.as_ref(), b"zero");
        assert_eq!(p1.as_ref(), b"one");

        // 이후 링크에 더 나오는 프레임은 ACK뿐, NAK은 정확히 1회
        let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
        while let Ok(Some(bytes)) =
            tokio::time::timeout_at(deadline, peer.receiver.recv()).await
        {
            let f = Frame::from_bytes(&bytes).unwrap();
            assert_ne!(f.kind, FrameKind::Nak, "중복 NAK 발생");
        }
        assert_eq!(engine.stats().nak_frames_sent, 1);

        // 중복 전달 없음
        assert!(timeout(Duration::from_millis(100), delivered.recv())
            .await
            .is_err());
        engine.stop();
        engine.join().await;
    }

    #[tokio::test]
    async fn stale_timeout_is_noop() {
        let (mut inner, mut event_rx, client, _delivered, mut peer) = manual_inner();

        // 크레딧 1 + 패킷 제출 → Ready 이벤트 → DATA(0) 송신
        inner.network.grant_credit(1).await.unwrap();
        client.submit(Bytes::from_static(b"p0")).await.unwrap();

        let ready = timeout(WAIT, event_rx.recv()).await.unwrap().unwrap();
        assert!(matches!(ready, Event::NetworkLayerReady));
        inner.handle_event(ready).await.unwrap();

        assert!(inner.send_window.is_outstanding(0));
        assert!(inner.timers.data_timer_armed(0));
        let sent = recv_frame(&mut peer).await;
        assert_eq!(sent.kind, FrameKind::Data);
        assert_eq!(sent.seq, 0);

        // 누적 ACK으로 seq 0 확인
        inner
            .handle_event(Event::FrameArrival(Frame::ack(0)))
            .await
            .unwrap();
        assert!(!inner.send_window.is_outstanding(0));
        assert!(!inner.timers.data_timer_armed(0));

        // 이미 확인된 seq의 stale Timeout은 재전송도 상태 변화도 없다
        inner.handle_event(Event::Timeout(0)).await.unwrap();
        assert_eq!(inner.stats.stale_timeouts, 1);
        assert_eq!(inner.stats.timeout_retransmits, 0);
        assert_eq!(inner.stats.data_frames_sent, 1);
        assert!(timeout(Duration::from_millis(100), peer.receiver.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn timeout_retransmits_only_that_frame() {
        let (mut inner, mut event_rx, client, _delivered, mut peer) = manual_inner();

        // DATA(0), DATA(1) 송신
        inner.network.grant_credit(2).await.unwrap();
        client.submit(Bytes::from_static(b"p0")).await.unwrap();
        client.submit(Bytes::from_static(b"p1")).await.unwrap();
        for _ in 0..2 {
            let ready = timeout(WAIT, event_rx.recv()).await.unwrap().unwrap();
            inner.handle_event(ready).await.unwrap();
            recv_frame(&mut peer).await;
        }

        // seq 0 타임아웃: seq 0 하나만 다시 나간다 (selective repeat)
        inner.handle_event(Event::Timeout(0)).await.unwrap();
        let retx = recv_frame(&mut peer).await;
        assert_eq!(retx.kind, FrameKind::Data);
        assert_eq!(retx.seq, 0);
        assert_eq!(retx.payload.as_deref(), Some(&b"p0"[..]));
        assert_eq!(inner.stats.timeout_retransmits, 1);
        assert!(timeout(Duration::from_millis(100), peer.receiver.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn cksum_err_flood_yields_single_nak() {
        let (mut inner, _event_rx, _client, mut delivered, mut peer) = manual_inner();

        // 같은 오류 구간의 CksumErr 폭주: NAK은 한 번만
        for _ in 0..5 {
            inner.handle_event(Event::CksumErr).await.unwrap();
        }
        assert_eq!(inner.stats.nak_frames_sent, 1);
        let nak = recv_frame(&mut peer).await;
        assert_eq!(nak.kind, FrameKind::Nak);
        assert!(timeout(Duration::from_millis(100), peer.receiver.recv())
            .await
            .is_err());

        // 순서 맞은 전달이 no_nak을 리셋하면 다음 오류 구간에서 다시 1회 허용
        inner
            .handle_event(Event::FrameArrival(Frame::data(
                0,
                7,
                Bytes::from_static(b"ok"),
            )))
            .await
            .unwrap();
        assert_eq!(
            timeout(WAIT, delivered.recv()).await.unwrap().unwrap().as_ref(),
            b"ok"
        );

        inner.handle_event(Event::CksumErr).await.unwrap();
        assert_eq!(inner.stats.nak_frames_sent, 2);
    }

    #[tokio::test]
    async fn piggyback_ack_cancels_only_covered_timers() {
        let (mut inner, mut event_rx, client, _delivered, mut peer) = manual_inner();

        // DATA(0), DATA(1) 송신: 타이머 둘 다 걸린다
        inner.network.grant_credit(2).await.unwrap();
        client.submit(Bytes::from_static(b"d0")).await.unwrap();
        client.submit(Bytes::from_static(b"d1")).await.unwrap();
        for _ in 0..2 {
            let ready = timeout(WAIT, event_rx.recv()).await.unwrap().unwrap();
            inner.handle_event(ready).await.unwrap();
            recv_frame(&mut peer).await;
        }
        assert!(inner.timers.data_timer_armed(0));
        assert!(inner.timers.data_timer_armed(1));

        // 상대가 seq 0을 전달하고 piggyback ack=0을 실어 보낸 상황
        inner
            .handle_event(Event::FrameArrival(Frame::data(
                0,
                0,
                Bytes::from_static(b"peer"),
            )))
            .await
            .unwrap();

        // ack_expected는 0 → 1로만 전진, seq 1 타이머는 유지
        assert_eq!(inner.send_window.ack_expected(), 1);
        assert!(!inner.timers.data_timer_armed(0));
        assert!(inner.timers.data_timer_armed(1));
        assert!(inner.send_window.is_outstanding(1));
    }

    #[tokio::test]
    async fn nak_triggers_immediate_retransmit() {
        let (mut inner, mut event_rx, client, _delivered, mut peer) = manual_inner();

        inner.network.grant_credit(1).await.unwrap();
        client.submit(Bytes::from_static(b"lost")).await.unwrap();
        let ready = timeout(WAIT, event_rx.recv()).await.unwrap().unwrap();
        inner.handle_event(ready).await.unwrap();
        recv_frame(&mut peer).await;

        // 상대의 NAK(ack=7): seq 0을 기다린다는 뜻 → 즉시 재전송
        inner
            .handle_event(Event::FrameArrival(Frame::nak(7)))
            .await
            .unwrap();
        let retx = recv_frame(&mut peer).await;
        assert_eq!(retx.kind, FrameKind::Data);
        assert_eq!(retx.seq, 0);
        assert_eq!(inner.stats.nak_retransmits, 1);

        // 윈도우 밖을 가리키는 NAK은 무시된다
        inner
            .handle_event(Event::FrameArrival(Frame::nak(3)))
            .await
            .unwrap();
        assert_eq!(inner.stats.nak_retransmits, 1);
    }
}
