//! 快照订阅源抽象与实现。
//!
//! 订阅源每次通知都下发通道下的**完整**记录集合（不是增量）。
//! 下游的曲线重建依赖这一点：若改为增量通知，需要换成合并语义。

use async_trait::async_trait;
use domain::{ChannelName, RawRecord};
use std::fmt;
use std::sync::Arc;

mod memory;
mod mqtt;
mod snapshot;

pub use memory::InMemoryFeed;
pub use mqtt::{MqttFeed, MqttFeedConfig};
pub use snapshot::{decode_record, decode_snapshot, decode_snapshot_value};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("source error: {0}")]
    Source(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// 订阅源上报的订阅级错误（取消、无权限、断线）。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("listener cancelled: {0}")]
    Cancelled(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("transport disconnected: {0}")]
    Disconnected(String),
}

/// 监听器句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(uuid::Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 快照监听器。
///
/// 回调在订阅源的投递线程上同步执行，实现方不应阻塞。
/// 订阅源可能在持有内部锁时回调，回调中不得再调用同一订阅源。
pub trait SnapshotListener: Send + Sync {
    fn on_batch(&self, batch: Vec<RawRecord>);
    fn on_error(&self, error: FeedError);
}

/// 按通道名订阅的快照源。
#[async_trait]
pub trait SnapshotFeed: Send + Sync {
    /// 注册监听器。
    ///
    /// 通道已有快照时，订阅源在注册后推送当前快照。通道从未有过数据时，
    /// 是否推送空批次取决于实现：`InMemoryFeed` 总是推送；`MqttFeed` 只在 broker
    /// 有保留消息时推送，因此调用方不能依赖首个空批次。
    async fn add_listener(
        &self,
        channel: &ChannelName,
        listener: Arc<dyn SnapshotListener>,
    ) -> Result<ListenerId, IngestError>;

    /// 移除监听器；返回是否确实移除。
    fn remove_listener(&self, id: ListenerId) -> bool;
}

#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) channel: ChannelName,
    pub(crate) listener: Arc<dyn SnapshotListener>,
}
