//! 프레임 정의와 와이어 코덱
//!
//! - DATA: seq + piggyback ack + 패킷 페이로드
//! - ACK/NAK: ack 필드만 (페이로드 없음)
//!
//! 와이어 형식: 헤더 길이(u16 LE) + bincode 헤더 + 페이로드 원본 바이트.
//! CRC32는 kind/seq/ack/페이로드 전체를 덮으므로 헤더 필드 변조도 잡힌다.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::seq::SeqNum;

/// 네트워크 계층 패킷 (엔진은 내용을 해석하지 않음)
pub type Packet = Bytes;

/// 프레임 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameKind {
    /// 데이터 프레임 (seq + 페이로드)
    Data = 1,

    /// 단독 누적 ACK
    Ack = 2,

    /// 재전송 요청 (마지막 정상 수신 시퀀스를 ack에 실음)
    Nak = 3,
}

/// 프레임 헤더 (와이어 직렬화 대상)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FrameHeader {
    /// 프레임 종류
    kind: FrameKind,

    /// 시퀀스 번호 (DATA에서만 의미 있음)
    seq: SeqNum,

    /// piggyback 누적 ACK (frame_expected - 1 mod 시퀀스 공간)
    ack: SeqNum,

    /// 페이로드 길이 (바이트)
    payload_len: u16,

    /// CRC32 체크섬 (kind + seq + ack + 페이로드)
    crc32: u32,
}

/// 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 프레임 종류
    pub kind: FrameKind,

    /// 시퀀스 번호
    pub seq: SeqNum,

    /// piggyback 누적 ACK
    pub ack: SeqNum,

    /// 페이로드 (DATA에서만 Some)
    pub payload: Option<Packet>,

    /// 와이어에 실리는 체크섬 (생성 시 계산, 수신 시 검증)
    crc32: u32,
}

impl Frame {
    /// DATA 프레임 생성
    pub fn data(seq: SeqNum, ack: SeqNum, payload: Packet) -> Self {
        let crc32 = Self::checksum(FrameKind::Data, seq, ack, &payload);
        Self {
            kind: FrameKind::Data,
            seq,
            ack,
            payload: Some(payload),
            crc32,
        }
    }

    /// 단독 ACK 프레임 생성
    pub fn ack(ack: SeqNum) -> Self {
        Self {
            kind: FrameKind::Ack,
            seq: 0,
            ack,
            payload: None,
            crc32: Self::checksum(FrameKind::Ack, 0, ack, &[]),
        }
    }

    /// NAK 프레임 생성
    pub fn nak(ack: SeqNum) -> Self {
        Self {
            kind: FrameKind::Nak,
            seq: 0,
            ack,
            payload: None,
            crc32: Self::checksum(FrameKind::Nak, 0, ack, &[]),
        }
    }

    fn checksum(kind: FrameKind, seq: SeqNum, ack: SeqNum, payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[kind as u8, seq, ack]);
        hasher.update(payload);
        hasher.finalize()
    }

    /// 프레임을 바이트로 직렬화
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.payload.as_deref().unwrap_or(&[]);
        let header = FrameHeader {
            kind: self.kind,
            seq: self.seq,
            ack: self.ack,
            payload_len: payload.len() as u16,
            crc32: self.crc32,
        };
        let header_bytes = bincode::serialize(&header).unwrap_or_default();
        let header_len = header_bytes.len() as u16;

        let mut buf = Vec::with_capacity(2 + header_bytes.len() + payload.len());
        buf.extend_from_slice(&header_len.to_le_bytes());
        buf.extend_from_slice(&header_bytes);
        buf.extend_from_slice(payload);
        buf
    }

    /// 바이트에서 프레임 역직렬화 (형식 오류 시 None)
    ///
    /// CRC 검증은 여기서 하지 않는다. 디코드된 프레임에 [`Frame::check_crc`]를
    /// 호출해 변조 여부를 따로 판정한다.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 2 {
            return None;
        }

        let header_len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        if bytes.len() < 2 + header_len {
            return None;
        }

        let header: FrameHeader = bincode::deserialize(&bytes[2..2 + header_len]).ok()?;
        let payload_bytes = &bytes[2 + header_len..];

        // 남은 바이트 수가 헤더가 말하는 페이로드 길이와 다르면 변조/절단
        if payload_bytes.len() != header.payload_len as usize {
            return None;
        }

        let payload = match header.kind {
            FrameKind::Data => Some(Bytes::copy_from_slice(payload_bytes)),
            // ACK/NAK은 페이로드가 없어야 한다
            FrameKind::Ack | FrameKind::Nak => {
                if !payload_bytes.is_empty() {
                    return None;
                }
                None
            }
        };

        Some(Self {
            kind: header.kind,
            seq: header.seq,
            ack: header.ack,
            payload,
            crc32: header.crc32,
        })
    }

    /// 수신 프레임 CRC 검증
    pub fn check_crc(&self) -> Result<()> {
        let payload = self.payload.as_deref().unwrap_or(&[]);
        let computed = Self::checksum(self.kind, self.seq, self.ack, payload);
        if computed == self.crc32 {
            Ok(())
        } else {
            Err(Error::CrcMismatch {
                expected: self.crc32,
                got: computed,
            })
        }
    }
}
