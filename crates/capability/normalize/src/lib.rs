//! 原始记录 → 曲线点位的解析与校验。

use chrono::{FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use domain::{Point, RawRecord};

/// 记录时间的固定格式（yyyy-MM-ddTHH:mm:ss）。
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const TIME_LEN: usize = 19;

/// 单条记录被拒绝的原因（MalformedRecord）。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("value missing")]
    MissingValue,
    #[error("value not numeric: {0}")]
    NonNumericValue(f64),
    #[error("time missing")]
    MissingTime,
    #[error("time format mismatch: {0}")]
    InvalidTime(String),
    #[error("time before epoch: {0}")]
    BeforeEpoch(String),
}

/// 记录解析器。
///
/// 无状态、无副作用：同一条记录多次解析结果一致。
/// `offset` 为记录时间所在的固定时区，默认 UTC。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordParser {
    offset: FixedOffset,
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::utc()
    }
}

impl RecordParser {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// 按分钟偏移构造；超出 ±24h 时返回 None。
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        let seconds = minutes.checked_mul(60)?;
        FixedOffset::east_opt(seconds).map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// 解析单条记录；失败时返回拒绝原因，不中断所在批次。
    pub fn parse(&self, raw: &RawRecord) -> Result<Point, RejectReason> {
        let value = raw.value.ok_or(RejectReason::MissingValue)?;
        if !value.is_finite() {
            return Err(RejectReason::NonNumericValue(value));
        }
        let time = raw.time.as_deref().ok_or(RejectReason::MissingTime)?;
        let timestamp_millis = self.parse_time(time)?;
        Ok(Point {
            timestamp_millis,
            value,
        })
    }

    /// 解析固定格式时间为 epoch 毫秒。
    pub fn parse_time(&self, time: &str) -> Result<i64, RejectReason> {
        if !has_fixed_shape(time) {
            return Err(RejectReason::InvalidTime(time.to_string()));
        }
        let naive = NaiveDateTime::parse_from_str(time, TIME_FORMAT)
            .map_err(|_| RejectReason::InvalidTime(time.to_string()))?;
        let local = self
            .offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| RejectReason::InvalidTime(time.to_string()))?;
        let millis = local.timestamp_millis();
        if millis < 0 {
            return Err(RejectReason::BeforeEpoch(time.to_string()));
        }
        Ok(millis)
    }
}

/// 使用默认解析器（UTC）解析单条记录。
pub fn parse(raw: &RawRecord) -> Result<Point, RejectReason> {
    RecordParser::default().parse(raw)
}

// chrono 的数字字段接受变长输入，这里先卡死 19 位定长形状。
fn has_fixed_shape(time: &str) -> bool {
    let bytes = time.as_bytes();
    if bytes.len() != TIME_LEN {
        return false;
    }
    bytes.iter().enumerate().all(|(index, byte)| match index {
        4 | 7 => *byte == b'-',
        10 => *byte == b'T',
        13 | 16 => *byte == b':',
        _ => byte.is_ascii_digit(),
    })
}
