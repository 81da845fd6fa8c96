#![allow(dead_code)]

use aircare_pipeline::{SeriesSink, SubscriptionError};
use domain::{ChannelName, RawRecord, Series};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum SinkEvent {
    Series(ChannelName, Series),
    Error(ChannelName, String),
}

/// 把回调转发到通道，便于测试按序等待。
pub struct ForwardingSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ForwardingSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SeriesSink for ForwardingSink {
    fn on_series(&self, channel: &ChannelName, series: Series) {
        let _ = self.tx.send(SinkEvent::Series(channel.clone(), series));
    }

    fn on_error(&self, channel: &ChannelName, error: &SubscriptionError) {
        let _ = self
            .tx
            .send(SinkEvent::Error(channel.clone(), error.to_string()));
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<SinkEvent>) -> SinkEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event in time")
        .expect("sink open")
}

pub async fn next_series(
    rx: &mut mpsc::UnboundedReceiver<SinkEvent>,
) -> (ChannelName, Series) {
    match next_event(rx).await {
        SinkEvent::Series(channel, series) => (channel, series),
        SinkEvent::Error(channel, error) => panic!("unexpected error on {channel}: {error}"),
    }
}

pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<SinkEvent>) {
    // 通道任务退出后 sink 被释放，recv 返回 None 也算安静
    match tokio::time::timeout(Duration::from_millis(150), rx.recv()).await {
        Err(_) | Ok(None) => {}
        Ok(Some(event)) => panic!("unexpected event: {event:?}"),
    }
}

pub fn reading(value: f64, time: &str) -> RawRecord {
    RawRecord::new(value, time)
}

pub fn values(series: &Series) -> Vec<f64> {
    series.iter().map(|point| point.value).collect()
}
