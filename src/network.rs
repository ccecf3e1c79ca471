//! 네트워크 계층 협력자
//!
//! - 애플리케이션이 제출한 송신 패킷을 큐잉
//! - 엔진이 부여한 크레딧만큼만 NetworkLayerReady 이벤트 발생
//!   (크레딧 = 송신 윈도우 여유 슬롯이므로 윈도우 초과 pull이 없다)
//! - 순서 맞게 재조립된 수신 패킷을 애플리케이션 채널로 전달

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::event::Event;
use crate::frame::Packet;
use crate::NR_BUFS;

/// 전달된 패킷 수신 채널 (애플리케이션 측)
pub type DeliveredReceiver = mpsc::Receiver<Packet>;

/// 애플리케이션 측 핸들
pub struct NetworkClient {
    submit_tx: mpsc::Sender<Packet>,
}

impl NetworkClient {
    /// 송신 패킷 제출 (크레딧이 생기면 엔진이 가져간다)
    pub async fn submit(&self, packet: Packet) -> Result<()> {
        self.submit_tx
            .send(packet)
            .await
            .map_err(|_| Error::NetworkLayerClosed)
    }
}

/// 엔진 측 핸들
pub struct NetworkLayer {
    ready_rx: mpsc::Receiver<Packet>,
    credit_tx: mpsc::Sender<usize>,
    delivered_tx: mpsc::Sender<Packet>,
}

impl NetworkLayer {
    /// 네트워크 계층 태스크 시작
    ///
    /// 반환: (엔진 핸들, 애플리케이션 핸들, 전달 패킷 채널)
    pub fn spawn(
        event_tx: mpsc::Sender<Event>,
        capacity: usize,
    ) -> (NetworkLayer, NetworkClient, DeliveredReceiver) {
        let (submit_tx, mut submit_rx) = mpsc::channel::<Packet>(capacity);
        let (ready_tx, ready_rx) = mpsc::channel::<Packet>(NR_BUFS);
        let (credit_tx, mut credit_rx) = mpsc::channel::<usize>(capacity);
        let (delivered_tx, delivered_rx) = mpsc::channel::<Packet>(capacity);

        tokio::spawn(async move {
            let mut pending: VecDeque<Packet> = VecDeque::new();
            let mut credit: usize = 0;
            let mut submit_open = true;

            loop {
                // 크레딧과 대기 패킷을 짝지어 Ready 이벤트 발생
                // (Ready 이벤트와 ready 채널 패킷은 1:1 대응)
                while credit > 0 {
                    let packet = match pending.pop_front() {
                        Some(p) => p,
                        None => break,
                    };
                    credit -= 1;
                    if ready_tx.send(packet).await.is_err() {
                        return;
                    }
                    if event_tx.send(Event::NetworkLayerReady).await.is_err() {
                        return;
                    }
                    trace!("NetworkLayerReady 발생 (잔여 크레딧 {})", credit);
                }

                if submit_open {
                    tokio::select! {
                        packet = submit_rx.recv() => match packet {
                            Some(p) => pending.push_back(p),
                            None => submit_open = false, // 애플리케이션 측 종료
                        },
                        granted = credit_rx.recv() => match granted {
                            Some(n) => credit += n,
                            None => return, // 엔진 종료
                        },
                    }
                } else {
                    // 제출이 끝났으면 남은 패킷만 흘려보낸다
                    if pending.is_empty() {
                        return;
                    }
                    match credit_rx.recv().await {
                        Some(n) => credit += n,
                        None => return,
                    }
                }
            }
        });

        (
            NetworkLayer {
                ready_rx,
                credit_tx,
                delivered_tx,
            },
            NetworkClient { submit_tx },
            delivered_rx,
        )
    }

    /// 송신 크레딧 부여 (시작 시 NR_BUFS, 이후 슬롯이 빌 때마다 1)
    pub async fn grant_credit(&self, n: usize) -> Result<()> {
        self.credit_tx
            .send(n)
            .await
            .map_err(|_| Error::NetworkLayerClosed)
    }

    /// Ready 이벤트와 짝지어진 다음 송신 패킷 꺼내기
    pub async fn next_outgoing_packet(&mut self) -> Result<Packet> {
        self.ready_rx.recv().await.ok_or(Error::NetworkLayerClosed)
    }

    /// 순서 맞은 패킷을 애플리케이션에 전달 (성공 수신당 정확히 1회 호출)
    pub async fn deliver(&self, packet: Packet) -> Result<()> {
        self.delivered_tx
            .send(packet)
            .await
            .map_err(|_| Error::NetworkLayerClosed)
    }
}
