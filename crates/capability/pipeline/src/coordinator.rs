//! 多通道协调：每个通道一个独立订阅，共享同一个曲线接收方。

use crate::subscription::{ChannelSubscription, SubscriptionHandle};
use crate::{SeriesSink, SubscriptionError};
use aircare_ingest::SnapshotFeed;
use aircare_normalize::RecordParser;
use domain::ChannelName;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// 流水线协调器，持有全部通道订阅。
pub struct PipelineCoordinator {
    subscription: ChannelSubscription,
    sink: Option<Arc<dyn SeriesSink>>,
    handles: BTreeMap<ChannelName, SubscriptionHandle>,
}

impl PipelineCoordinator {
    pub fn new(feed: Arc<dyn SnapshotFeed>, parser: RecordParser) -> Self {
        Self {
            subscription: ChannelSubscription::new(feed, parser),
            sink: None,
            handles: BTreeMap::new(),
        }
    }

    /// 为每个（去重后的）通道建立订阅。
    ///
    /// 单个通道注册失败不影响其他通道：失败会记录日志并通过 `sink.on_error` 上报，
    /// 之后可用 `resubscribe` 重试。
    pub async fn start<I, C>(
        &mut self,
        channels: I,
        sink: Arc<dyn SeriesSink>,
    ) -> Result<(), SubscriptionError>
    where
        I: IntoIterator<Item = C>,
        C: Into<ChannelName>,
    {
        if self.sink.is_some() {
            return Err(SubscriptionError::AlreadyStarted);
        }
        self.sink = Some(sink.clone());

        let mut started = 0usize;
        for channel in channels {
            let channel = channel.into();
            if self.handles.contains_key(&channel) {
                continue;
            }
            match self.subscription.subscribe(channel.clone(), sink.clone()).await {
                Ok(handle) => {
                    self.handles.insert(channel, handle);
                    started += 1;
                }
                Err(err) => {
                    warn!(
                        target: "aircare.pipeline",
                        channel = %channel,
                        error = %err,
                        "subscription_register_failed"
                    );
                    sink.on_error(&channel, &err);
                }
            }
        }
        info!(target: "aircare.pipeline", channels = started, "pipeline_started");
        Ok(())
    }

    /// 重新订阅一个已失效（取消或出错）的通道；仍在运行时不做任何事。
    pub async fn resubscribe(
        &mut self,
        channel: impl Into<ChannelName>,
    ) -> Result<(), SubscriptionError> {
        let channel = channel.into();
        let sink = self.sink.clone().ok_or(SubscriptionError::NotStarted)?;
        if let Some(handle) = self.handles.get(&channel) {
            if handle.is_active() {
                return Ok(());
            }
        }
        let handle = self.subscription.subscribe(channel.clone(), sink).await?;
        if let Some(previous) = self.handles.insert(channel.clone(), handle) {
            previous.cancel();
        }
        info!(target: "aircare.pipeline", channel = %channel, "subscription_restarted");
        Ok(())
    }

    /// 取消单个通道。
    pub fn cancel(&self, channel: &ChannelName) -> Result<(), SubscriptionError> {
        let handle = self
            .handles
            .get(channel)
            .ok_or_else(|| SubscriptionError::UnknownChannel(channel.clone()))?;
        handle.cancel();
        Ok(())
    }

    /// 取消全部通道。
    pub fn stop(&self) {
        for handle in self.handles.values() {
            handle.cancel();
        }
    }

    /// 取消全部通道并等待各通道任务退出。
    pub async fn shutdown(mut self) {
        self.stop();
        for handle in self.handles.values_mut() {
            handle.closed().await;
        }
        info!(target: "aircare.pipeline", "pipeline_stopped");
    }

    pub fn is_active(&self, channel: &ChannelName) -> bool {
        self.handles
            .get(channel)
            .map(SubscriptionHandle::is_active)
            .unwrap_or(false)
    }

    /// 所有已知通道（含已失效的）。
    pub fn channels(&self) -> Vec<ChannelName> {
        self.handles.keys().cloned().collect()
    }

    /// 仍在运行的通道。
    pub fn active_channels(&self) -> Vec<ChannelName> {
        self.handles
            .iter()
            .filter(|(_, handle)| handle.is_active())
            .map(|(channel, _)| channel.clone())
            .collect()
    }
}
