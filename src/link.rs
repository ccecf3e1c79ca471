//! 시뮬레이션 물리 계층
//!
//! 실제 소켓 없이 in-process mpsc 채널 쌍으로 두 스테이션을 연결한다.
//! 송신 측에서 설정된 확률로 프레임을 버리거나 바이트 하나를 변조한다.
//! 변조된 프레임은 수신 측 디코드/CRC 검증에서 걸러져 CksumErr 이벤트가
//! 되므로, 엔진 입장에서 손상은 반환값이 아니라 이벤트로만 나타난다.

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::frame::Frame;

/// 링크 손실/변조 설정
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// 프레임 손실률 (0.0 ~ 1.0)
    pub loss_rate: f64,

    /// 프레임 변조율 (0.0 ~ 1.0)
    pub corrupt_rate: f64,

    /// 채널 용량 (프레임 수)
    pub capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            capacity: 256,
        }
    }
}

/// 링크 송신 반쪽
pub struct LinkSender {
    tx: mpsc::Sender<Vec<u8>>,
    config: LinkConfig,
}

/// 링크 수신 반쪽
pub struct LinkReceiver {
    rx: mpsc::Receiver<Vec<u8>>,
}

/// 스테이션 한쪽의 링크 포트
pub struct LinkPort {
    pub sender: LinkSender,
    pub receiver: LinkReceiver,
}

impl LinkPort {
    /// 양방향으로 연결된 포트 쌍 생성
    pub fn pair(config: LinkConfig) -> (LinkPort, LinkPort) {
        let (a_tx, b_rx) = mpsc::channel(config.capacity);
        let (b_tx, a_rx) = mpsc::channel(config.capacity);

        (
            LinkPort {
                sender: LinkSender { tx: a_tx, config },
                receiver: LinkReceiver { rx: a_rx },
            },
            LinkPort {
                sender: LinkSender { tx: b_tx, config },
                receiver: LinkReceiver { rx: b_rx },
            },
        )
    }
}

impl LinkSender {
    /// 프레임 송신 (손실/변조 시뮬레이션 포함)
    ///
    /// 손실된 프레임도 Ok를 반환한다. 손실 복구는 프로토콜의 몫이다.
    pub async fn transmit(&self, frame: &Frame) -> Result<()> {
        let bytes = {
            let mut rng = rand::thread_rng();

            if self.config.loss_rate > 0.0 && rng.gen_bool(self.config.loss_rate) {
                debug!(
                    "링크 손실: kind={:?} seq={} ack={}",
                    frame.kind, frame.seq, frame.ack
                );
                return Ok(());
            }

            let mut bytes = frame.to_bytes();
            if self.config.corrupt_rate > 0.0 && rng.gen_bool(self.config.corrupt_rate) {
                let idx = rng.gen_range(0..bytes.len());
                bytes[idx] ^= 0xFF;
                debug!(
                    "링크 변조: kind={:?} seq={} (byte {})",
                    frame.kind, frame.seq, idx
                );
            }
            bytes
        };

        self.tx.send(bytes).await.map_err(|_| Error::LinkClosed)
    }
}

impl LinkReceiver {
    /// 다음 프레임의 원본 바이트 수신 (링크 탭/테스트용)
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// 수신 태스크 시작
    ///
    /// 도착 바이트를 디코드/CRC 검증해 FrameArrival 또는 CksumErr
    /// 이벤트로 엔진 이벤트 채널에 넣는다.
    pub fn spawn_arrival_task(mut self, event_tx: mpsc::Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(bytes) = self.rx.recv().await {
                let event = match Frame::from_bytes(&bytes) {
                    Some(frame) => match frame.check_crc() {
                        Ok(()) => Event::FrameArrival(frame),
                        Err(e) => {
                            trace!("CRC 검증 실패: {}", e);
                            Event::CksumErr
                        }
                    },
                    None => {
                        trace!("프레임 디코드 실패 ({} bytes)", bytes.len());
                        Event::CksumErr
                    }
                };

                if event_tx.send(event).await.is_err() {
                    break; // 엔진 종료
                }
            }
        })
    }
}
