//! 内存快照源
//!
//! 用于本地回放和测试。按通道保存当前完整快照，任何写入后向该通道全部监听器推送整批快照。
//!
//! 投递在写锁内完成：同一通道的通知顺序与写入顺序一致，监听器最后收到的总是当前快照。
//! 因此监听器回调不能阻塞，也不能回调本订阅源。

use crate::{FeedError, IngestError, ListenerId, Registration, SnapshotFeed, SnapshotListener};
use async_trait::async_trait;
use domain::{ChannelName, RawRecord};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct FeedState {
    snapshots: HashMap<ChannelName, Vec<RawRecord>>,
    listeners: HashMap<ListenerId, Registration>,
}

impl FeedState {
    fn listeners_of(&self, channel: &ChannelName) -> Vec<Arc<dyn SnapshotListener>> {
        self.listeners
            .values()
            .filter(|registration| &registration.channel == channel)
            .map(|registration| registration.listener.clone())
            .collect()
    }
}

/// 内存快照源
#[derive(Default)]
pub struct InMemoryFeed {
    state: RwLock<FeedState>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换通道快照并通知。
    pub fn publish(
        &self,
        channel: impl Into<ChannelName>,
        records: Vec<RawRecord>,
    ) -> Result<(), IngestError> {
        let channel = channel.into();
        let mut state = self.write()?;
        state.snapshots.insert(channel.clone(), records.clone());
        for listener in state.listeners_of(&channel) {
            listener.on_batch(records.clone());
        }
        Ok(())
    }

    /// 追加一条记录，然后推送完整快照。
    pub fn append(
        &self,
        channel: impl Into<ChannelName>,
        record: RawRecord,
    ) -> Result<(), IngestError> {
        let channel = channel.into();
        let mut state = self.write()?;
        let records = state.snapshots.entry(channel.clone()).or_default();
        records.push(record);
        let records = records.clone();
        for listener in state.listeners_of(&channel) {
            listener.on_batch(records.clone());
        }
        Ok(())
    }

    /// 向通道监听器上报错误，并摘除这些监听器。
    pub fn fail(&self, channel: impl Into<ChannelName>, error: FeedError) -> Result<(), IngestError> {
        let channel = channel.into();
        let mut state = self.write()?;
        for listener in state.listeners_of(&channel) {
            listener.on_error(error.clone());
        }
        state
            .listeners
            .retain(|_, registration| registration.channel != channel);
        Ok(())
    }

    /// 当前快照（用于测试）。
    pub fn snapshot(&self, channel: &ChannelName) -> Vec<RawRecord> {
        self.state
            .read()
            .map(|state| state.snapshots.get(channel).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// 通道监听器数量（用于测试）。
    pub fn listener_count(&self, channel: &ChannelName) -> usize {
        self.state
            .read()
            .map(|state| state.listeners_of(channel).len())
            .unwrap_or(0)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, FeedState>, IngestError> {
        self.state
            .write()
            .map_err(|_| IngestError::Source("lock failed".to_string()))
    }
}

#[async_trait]
impl SnapshotFeed for InMemoryFeed {
    async fn add_listener(
        &self,
        channel: &ChannelName,
        listener: Arc<dyn SnapshotListener>,
    ) -> Result<ListenerId, IngestError> {
        let id = ListenerId::new();
        let mut state = self.write()?;
        state.listeners.insert(
            id,
            Registration {
                channel: channel.clone(),
                listener: listener.clone(),
            },
        );
        let current = state.snapshots.get(channel).cloned().unwrap_or_default();
        listener.on_batch(current);
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        match self.state.write() {
            Ok(mut state) => state.listeners.remove(&id).is_some(),
            Err(_) => false,
        }
    }
}
