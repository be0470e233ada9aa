//! 패킷 프레이밍
//!
//! 헤더 (네트워크 바이트 순서, 7바이트):
//!
//! ```text
//! +-------------+------------+--------+---------------------+
//! | seq_num u32 | chksum u16 | flag u8| payload (0~1400)    |
//! +-------------+------------+--------+---------------------+
//! ```
//!
//! 체크섬은 체크섬 필드를 0으로 둔 헤더 + 페이로드 전체에 대한
//! 16비트 1의 보수 인터넷 체크섬이다. 수신 측은 받은 바이트 전체에 대해
//! 다시 계산하고 0이 아니면 손상된 패킷으로 본다.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result, MAX_PAYLOAD_SIZE};

/// 헤더 길이 (바이트)
pub const HEADER_LEN: usize = 7;

/// 최대 패킷 길이 (헤더 + 페이로드)
pub const MAX_PACKET_LEN: usize = HEADER_LEN + MAX_PAYLOAD_SIZE;

/// 체크섬 필드 오프셋
const CHECKSUM_OFFSET: usize = 4;

/// 패킷 플래그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Flag {
    /// 누적 ACK: N번까지 모두 기록됨
    Ack = 5,

    /// 선택적 재전송 요청: 정확히 N번
    Srej = 6,

    /// 파일명 요청 (윈도우 크기 + 버퍼 크기 + 파일명)
    Fname = 8,

    /// 파일 열기 성공
    FnameOk = 9,

    /// 파일 끝
    EndOfFile = 10,

    /// 데이터
    Data = 16,

    /// SREJ로 인한 재전송 데이터
    SrejData = 17,

    /// 타임아웃으로 인한 재전송 데이터
    TimeoutData = 18,

    /// 파일 열기 실패
    FnameBad = 32,

    /// EOF 확인
    EofAck = 33,
}

impl Flag {
    /// 데이터를 담은 패킷인지
    pub fn is_data(self) -> bool {
        matches!(self, Flag::Data | Flag::SrejData | Flag::TimeoutData)
    }
}

impl TryFrom<u8> for Flag {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        let flag = match value {
            5 => Flag::Ack,
            6 => Flag::Srej,
            8 => Flag::Fname,
            9 => Flag::FnameOk,
            10 => Flag::EndOfFile,
            16 => Flag::Data,
            17 => Flag::SrejData,
            18 => Flag::TimeoutData,
            32 => Flag::FnameBad,
            33 => Flag::EofAck,
            other => return Err(Error::UnknownFlag(other)),
        };
        Ok(flag)
    }
}

/// 디코딩된 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq_num: u32,
    pub flag: Flag,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(seq_num: u32, flag: Flag, payload: Bytes) -> Self {
        Self {
            seq_num,
            flag,
            payload,
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Result<Bytes> {
        encode(&self.payload, self.flag, self.seq_num)
    }
}

/// 16비트 1의 보수 인터넷 체크섬 (RFC 1071)
///
/// 홀수 길이면 마지막 바이트를 상위 바이트로 보고 0으로 채운다.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }

    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// 페이로드를 헤더로 감싸 패킷 생성
pub fn encode(payload: &[u8], flag: Flag, seq_num: u32) -> Result<Bytes> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u32(seq_num);
    buf.put_u16(0);
    buf.put_u8(flag as u8);
    buf.put_slice(payload);

    let checksum = internet_checksum(&buf);
    buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&checksum.to_be_bytes());

    Ok(buf.freeze())
}

/// 패킷 파싱
///
/// 체크섬이 맞지 않으면 `Error::Corrupt`. 호출자는 이를 조용히 버려야 한다.
pub fn decode(bytes: &[u8]) -> Result<Packet> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Truncated { len: bytes.len() });
    }
    if internet_checksum(bytes) != 0 {
        return Err(Error::Corrupt);
    }

    let mut header = &bytes[..HEADER_LEN];
    let seq_num = header.get_u32();
    let _checksum = header.get_u16();
    let flag = Flag::try_from(header.get_u8())?;

    Ok(Packet {
        seq_num,
        flag,
        payload: Bytes::copy_from_slice(&bytes[HEADER_LEN..]),
    })
}
