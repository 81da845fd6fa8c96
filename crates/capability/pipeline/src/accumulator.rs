//! 曲线重建。

use aircare_normalize::{RecordParser, RejectReason};
use aircare_telemetry::{record_records_accepted, record_records_rejected};
use domain::{ChannelName, RawRecord, Series};
use tracing::debug;

/// 单条被拒绝的记录（批内下标 + 原因）。
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub index: usize,
    pub reason: RejectReason,
}

/// 一次重建的结果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildOutcome {
    pub series: Series,
    pub rejections: Vec<Rejection>,
}

/// 逐条解析整批记录，丢弃被拒绝的记录，保持其余记录的相对顺序。
pub fn collect_points(parser: &RecordParser, batch: &[RawRecord]) -> RebuildOutcome {
    let mut points = Vec::with_capacity(batch.len());
    let mut rejections = Vec::new();
    for (index, raw) in batch.iter().enumerate() {
        match parser.parse(raw) {
            Ok(point) => points.push(point),
            Err(reason) => rejections.push(Rejection { index, reason }),
        }
    }
    RebuildOutcome {
        series: Series::new(points),
        rejections,
    }
}

/// 单通道曲线累加器。
///
/// 依赖订阅源的全量快照语义：每批都整体替换当前曲线。
/// 若订阅源改为增量通知，这里需要换成合并语义（不兼容变更）。
#[derive(Debug, Clone)]
pub struct SeriesAccumulator {
    channel: ChannelName,
    parser: RecordParser,
    current: Series,
}

impl SeriesAccumulator {
    pub fn new(channel: ChannelName, parser: RecordParser) -> Self {
        Self {
            channel,
            parser,
            current: Series::default(),
        }
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// 当前持有的曲线。
    pub fn current(&self) -> &Series {
        &self.current
    }

    /// 用整批快照重建曲线并替换当前曲线。
    pub fn rebuild(&mut self, batch: &[RawRecord]) -> Series {
        let outcome = collect_points(&self.parser, batch);
        for rejection in &outcome.rejections {
            debug!(
                target: "aircare.pipeline",
                channel = %self.channel,
                index = rejection.index,
                reason = %rejection.reason,
                "record_rejected"
            );
        }
        record_records_accepted(outcome.series.len() as u64);
        record_records_rejected(outcome.rejections.len() as u64);
        self.current = outcome.series;
        self.current.clone()
    }
}
