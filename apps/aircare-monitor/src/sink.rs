//! 日志曲线接收方
//!
//! 绘图由展示层负责；这里只把每次更新的摘要写入日志。

use aircare_pipeline::{SeriesSink, SubscriptionError};
use domain::{ChannelName, Series};
use tracing::{error, info};

pub struct LoggingSink;

impl SeriesSink for LoggingSink {
    fn on_series(&self, channel: &ChannelName, series: Series) {
        info!(
            target: "aircare.app",
            channel = %channel,
            points = series.len(),
            first_ts_ms = ?series.first().map(|point| point.timestamp_millis),
            last_ts_ms = ?series.last().map(|point| point.timestamp_millis),
            last_value = ?series.last().map(|point| point.value),
            "series_ready"
        );
    }

    fn on_error(&self, channel: &ChannelName, error: &SubscriptionError) {
        error!(
            target: "aircare.app",
            channel = %channel,
            error = %error,
            "channel_unavailable"
        );
    }
}
