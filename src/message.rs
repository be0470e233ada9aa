//! 핸드쉐이크 메시지 정의
//!
//! FNAME 페이로드:
//!
//! ```text
//! | window_size u32 | buffer_size u32 | filename (가변, NUL 없음) |
//! ```
//!
//! 파일명 길이는 UDP 데이터그램 길이로부터 결정된다.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::TransferParams;
use crate::packet::{self, Flag};
use crate::{Error, Result, MAX_FILENAME_LEN};

/// 고정 필드 길이 (window_size + buffer_size)
const FIXED_LEN: usize = 8;

/// 파일명 요청 (수신자 → 송신자)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameRequest {
    /// 협상된 윈도우/버퍼 크기
    pub params: TransferParams,

    /// 송신자 측 원본 파일 경로
    pub filename: String,
}

impl FilenameRequest {
    /// 검증된 요청 생성
    pub fn new(params: TransferParams, filename: impl Into<String>) -> Result<Self> {
        let request = Self {
            params,
            filename: filename.into(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        if self.filename.is_empty() {
            return Err(Error::InvalidFilename { reason: "비어 있음" });
        }
        if self.filename.len() > MAX_FILENAME_LEN {
            return Err(Error::InvalidFilename {
                reason: "100바이트 초과",
            });
        }
        if self.filename.contains('\0') {
            return Err(Error::InvalidFilename {
                reason: "NUL 문자 포함",
            });
        }
        Ok(())
    }

    /// FNAME 페이로드로 직렬화
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FIXED_LEN + self.filename.len());
        buf.put_u32(self.params.window_size);
        buf.put_u32(self.params.buffer_size);
        buf.put_slice(self.filename.as_bytes());
        buf.freeze()
    }

    /// 헤더까지 포함한 FNAME 패킷 생성
    pub fn to_packet(&self) -> Result<Bytes> {
        packet::encode(&self.to_payload(), Flag::Fname, 0)
    }

    /// FNAME 페이로드에서 역직렬화 + 검증
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() <= FIXED_LEN {
            return Err(Error::InvalidFilename {
                reason: "페이로드가 너무 짧음",
            });
        }

        let mut fixed = &payload[..FIXED_LEN];
        let params = TransferParams {
            window_size: fixed.get_u32(),
            buffer_size: fixed.get_u32(),
        };

        let filename = std::str::from_utf8(&payload[FIXED_LEN..])
            .map_err(|_| Error::InvalidFilename {
                reason: "UTF-8 아님",
            })?
            .to_string();

        let request = Self { params, filename };
        request.validate()?;
        Ok(request)
    }
}
