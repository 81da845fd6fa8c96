//! 单通道订阅
//!
//! 每个通道一个 tokio 任务：监听器只负责把通知塞进无界队列，
//! 解析与重建都在通道自己的任务里完成，慢通道不会拖住订阅源或其他通道。
//!
//! 队列不设上限：订阅源回调不能阻塞，也不能丢弃快照。
//! 积压深度由 `SubscriptionHandle::queue_depth` 和 `max_queue_depth` 指标暴露，
//! 积压升至 `QUEUE_BACKLOG_WARN` 时记告警日志。

use crate::accumulator::SeriesAccumulator;
use crate::{SeriesSink, SubscriptionError};
use aircare_ingest::{FeedError, ListenerId, SnapshotFeed, SnapshotListener};
use aircare_normalize::RecordParser;
use aircare_telemetry::{
    new_subscription_id, record_empty_batch, record_queue_depth, record_series_published,
    record_snapshot_received, record_subscription_cancelled, record_subscription_error,
};
use domain::{ChannelName, RawRecord};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

enum Notification {
    Batch(Vec<RawRecord>),
    Error(FeedError),
}

/// 单通道积压告警阈值。
pub const QUEUE_BACKLOG_WARN: usize = 64;

/// 注册到订阅源的监听器：只转发，不处理。
struct QueueListener {
    channel: ChannelName,
    tx: mpsc::UnboundedSender<Notification>,
    pending: Arc<AtomicUsize>,
}

impl QueueListener {
    fn enqueue(&self, notification: Notification) {
        let depth = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if self.tx.send(notification).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        record_queue_depth(depth as u64);
        if depth == QUEUE_BACKLOG_WARN {
            warn!(
                target: "aircare.pipeline",
                channel = %self.channel,
                depth,
                "subscription_backlog"
            );
        }
    }
}

impl SnapshotListener for QueueListener {
    fn on_batch(&self, batch: Vec<RawRecord>) {
        self.enqueue(Notification::Batch(batch));
    }

    fn on_error(&self, error: FeedError) {
        self.enqueue(Notification::Error(error));
    }
}

struct SubscriptionState {
    channel: ChannelName,
    feed: Arc<dyn SnapshotFeed>,
    listener_id: OnceLock<ListenerId>,
    active: AtomicBool,
    pending: Arc<AtomicUsize>,
    cancel_tx: watch::Sender<bool>,
}

impl SubscriptionState {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// 摘除监听器并通知任务退出；仅首次调用返回 true。
    fn detach(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.cancel_tx.send_replace(true);
        if let Some(id) = self.listener_id.get() {
            self.feed.remove_listener(*id);
        }
        true
    }
}

/// 订阅句柄。
///
/// `cancel` 之后不会再开始新的 `on_series` 回调；已在执行中的回调允许完成。
/// 句柄被 drop 时同样会取消订阅。
pub struct SubscriptionHandle {
    state: Arc<SubscriptionState>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn channel(&self) -> &ChannelName {
        &self.state.channel
    }

    pub fn listener_id(&self) -> Option<ListenerId> {
        self.state.listener_id.get().copied()
    }

    /// 订阅是否仍在接收通知（取消或订阅源报错后为 false）。
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// 已入队、尚未被通道任务取走的通知数。
    pub fn queue_depth(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// 取消订阅，可重复调用。
    pub fn cancel(&self) {
        if self.state.detach() {
            record_subscription_cancelled();
            info!(
                target: "aircare.pipeline",
                channel = %self.state.channel,
                "subscription_cancelled"
            );
        }
    }

    /// 等待通道任务结束（取消或出错之后）。
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(
                    target: "aircare.pipeline",
                    channel = %self.state.channel,
                    error = %err,
                    "subscription_task_join_failed"
                );
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.state.detach();
    }
}

/// 通道订阅：按配置（订阅源 + 解析器）为任意通道名建立订阅。
#[derive(Clone)]
pub struct ChannelSubscription {
    feed: Arc<dyn SnapshotFeed>,
    parser: RecordParser,
}

impl ChannelSubscription {
    pub fn new(feed: Arc<dyn SnapshotFeed>, parser: RecordParser) -> Self {
        Self { feed, parser }
    }

    pub fn parser(&self) -> RecordParser {
        self.parser
    }

    /// 订阅通道：每次全量快照通知重建一次曲线，并调用一次 `sink.on_series`。
    ///
    /// 必须在 tokio 运行时内调用。
    pub async fn subscribe(
        &self,
        channel: impl Into<ChannelName>,
        sink: Arc<dyn SeriesSink>,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        let channel = channel.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let state = Arc::new(SubscriptionState {
            channel: channel.clone(),
            feed: self.feed.clone(),
            listener_id: OnceLock::new(),
            active: AtomicBool::new(true),
            pending: Arc::new(AtomicUsize::new(0)),
            cancel_tx,
        });

        let span = tracing::info_span!(
            "channel",
            channel = %channel,
            subscription_id = %new_subscription_id()
        );
        let accumulator = SeriesAccumulator::new(channel.clone(), self.parser);
        let task = tokio::spawn(
            run_channel(state.clone(), accumulator, sink, rx, cancel_rx).instrument(span),
        );
        let mut handle = SubscriptionHandle {
            state: state.clone(),
            task: Some(task),
        };

        let listener = Arc::new(QueueListener {
            channel: channel.clone(),
            tx,
            pending: state.pending.clone(),
        });
        let id = match self.feed.add_listener(&channel, listener).await {
            Ok(id) => id,
            Err(err) => {
                state.detach();
                handle.closed().await;
                return Err(SubscriptionError::Register {
                    channel,
                    message: err.to_string(),
                });
            }
        };
        let _ = state.listener_id.set(id);
        // 注册期间已被取消（例如订阅源同步报错）时，补摘监听器
        if !state.is_active() {
            self.feed.remove_listener(id);
        }
        info!(
            target: "aircare.pipeline",
            channel = %channel,
            listener_id = %id,
            "subscription_started"
        );
        Ok(handle)
    }
}

async fn run_channel(
    state: Arc<SubscriptionState>,
    mut accumulator: SeriesAccumulator,
    sink: Arc<dyn SeriesSink>,
    mut rx: mpsc::UnboundedReceiver<Notification>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let channel = state.channel.clone();
    loop {
        let notification = tokio::select! {
            biased;
            _ = cancel_rx.changed() => break,
            notification = rx.recv() => match notification {
                Some(notification) => notification,
                None => break,
            },
        };
        state.pending.fetch_sub(1, Ordering::SeqCst);
        if !state.is_active() {
            break;
        }
        match notification {
            Notification::Batch(batch) => {
                record_snapshot_received();
                if batch.is_empty() {
                    record_empty_batch();
                }
                debug!(
                    target: "aircare.pipeline",
                    channel = %channel,
                    records = batch.len(),
                    "snapshot_received"
                );
                let series = accumulator.rebuild(&batch);
                debug!(
                    target: "aircare.pipeline",
                    channel = %channel,
                    points = series.len(),
                    rejected = batch.len() - series.len(),
                    "series_published"
                );
                sink.on_series(&channel, series);
                record_series_published();
            }
            Notification::Error(error) => {
                record_subscription_error();
                warn!(
                    target: "aircare.pipeline",
                    channel = %channel,
                    error = %error,
                    "subscription_failed"
                );
                state.detach();
                let error = SubscriptionError::Feed {
                    channel: channel.clone(),
                    source: error,
                };
                sink.on_error(&channel, &error);
                break;
            }
        }
    }
}
