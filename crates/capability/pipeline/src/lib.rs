//! 快照 → 曲线的流水线：曲线重建、单通道订阅、多通道协调。

use aircare_ingest::FeedError;
use domain::{ChannelName, Series};

pub mod accumulator;
pub mod coordinator;
pub mod subscription;

pub use accumulator::{RebuildOutcome, Rejection, SeriesAccumulator, collect_points};
pub use coordinator::PipelineCoordinator;
pub use subscription::{ChannelSubscription, QUEUE_BACKLOG_WARN, SubscriptionHandle};

/// 订阅错误（SubscriptionError）。出错后该通道不再接收通知，需调用方重新订阅。
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscriptionError {
    #[error("feed error on {channel}: {source}")]
    Feed {
        channel: ChannelName,
        source: FeedError,
    },
    #[error("register listener on {channel} failed: {message}")]
    Register {
        channel: ChannelName,
        message: String,
    },
    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelName),
    #[error("pipeline already started")]
    AlreadyStarted,
    #[error("pipeline not started")]
    NotStarted,
}

impl SubscriptionError {
    pub fn channel(&self) -> Option<&ChannelName> {
        match self {
            Self::Feed { channel, .. }
            | Self::Register { channel, .. }
            | Self::UnknownChannel(channel) => Some(channel),
            Self::AlreadyStarted | Self::NotStarted => None,
        }
    }
}

/// 曲线接收方（展示层）。
///
/// 回调在各通道任务上执行；同一通道的回调按订阅源下发顺序串行，不同通道之间无顺序保证。
pub trait SeriesSink: Send + Sync {
    /// 通道有新的完整曲线。
    fn on_series(&self, channel: &ChannelName, series: Series);

    /// 通道订阅失败。错误已按 warn 级别记录日志并计数；默认不做额外处理。
    fn on_error(&self, channel: &ChannelName, error: &SubscriptionError) {
        let _ = (channel, error);
    }
}

impl<F> SeriesSink for F
where
    F: Fn(&ChannelName, Series) + Send + Sync,
{
    fn on_series(&self, channel: &ChannelName, series: Series) {
        self(channel, series)
    }
}
