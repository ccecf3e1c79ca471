//! 시퀀스 번호 연산
//!
//! 모든 연산은 modulo (MAX_SEQ + 1)

use crate::MAX_SEQ;

/// 시퀀스 번호 (0 ..= MAX_SEQ)
pub type SeqNum = u8;

/// 시퀀스 번호 증가 (MAX_SEQ 다음은 0)
#[inline]
pub fn inc(n: SeqNum) -> SeqNum {
    (n + 1) % (MAX_SEQ + 1)
}

/// 순환 윈도우 `[a, c)` 안에 `b`가 있는지 검사
///
/// wraparound 포함 세 가지 경우:
/// - `a <= b < c` (랩 없음)
/// - `c < a <= b` (랩 지점이 b 뒤)
/// - `b < c < a` (랩 지점이 a 앞)
#[inline]
pub fn between(a: SeqNum, b: SeqNum, c: SeqNum) -> bool {
    ((a <= b) && (b < c)) || ((c < a) && (a <= b)) || ((b < c) && (c < a))
}
