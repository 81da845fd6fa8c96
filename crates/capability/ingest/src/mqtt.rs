//! MQTT 快照源
//!
//! 每个通道对应主题 `{prefix}/{channel}`，报文为该通道的完整 JSON 快照，
//! 发布端以 retained 方式写入，订阅时 broker 立即下发当前快照。
//! 主题上没有保留消息时 broker 不下发任何内容，监听器在首次发布前收不到批次。

use crate::snapshot::decode_snapshot;
use crate::{FeedError, IngestError, ListenerId, Registration, SnapshotFeed, SnapshotListener};
use aircare_telemetry::record_payload_undecodable;
use async_trait::async_trait;
use domain::ChannelName;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// MQTT 快照源配置。
#[derive(Debug, Clone)]
pub struct MqttFeedConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
}

/// MQTT 快照源。
///
/// `run` 驱动事件循环并分发快照；需要在独立任务中常驻运行。
pub struct MqttFeed {
    config: MqttFeedConfig,
    client: rumqttc::AsyncClient,
    eventloop: tokio::sync::Mutex<rumqttc::EventLoop>,
    listeners: RwLock<HashMap<ListenerId, Registration>>,
}

impl MqttFeed {
    pub fn new(config: MqttFeedConfig) -> Self {
        let client_id = format!("aircare-feed-{}", now_epoch_ms());
        let mut options = rumqttc::MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            options.set_credentials(username, password);
        }
        let (client, eventloop) = rumqttc::AsyncClient::new(options, 10);
        Self {
            config,
            client,
            eventloop: tokio::sync::Mutex::new(eventloop),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MqttFeedConfig {
        &self.config
    }

    /// 通道对应的快照主题。
    pub fn topic_for(&self, channel: &ChannelName) -> String {
        format!(
            "{}/{}",
            self.config.topic_prefix.trim_end_matches('/'),
            channel
        )
    }

    /// 驱动事件循环，直到连接出错。出错时向全部监听器上报断线。
    pub async fn run(&self) -> Result<(), IngestError> {
        let mut eventloop = self.eventloop.lock().await;
        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish))) => {
                    self.dispatch(&publish.topic, &publish.payload);
                }
                Ok(_) => {}
                Err(err) => {
                    let error = FeedError::Disconnected(err.to_string());
                    for listener in self.all_listeners() {
                        listener.on_error(error.clone());
                    }
                    return Err(IngestError::Source(err.to_string()));
                }
            }
        }
    }

    fn dispatch(&self, topic: &str, payload: &[u8]) {
        let Some(channel) = channel_from_topic(&self.config.topic_prefix, topic) else {
            warn!(target: "aircare.ingest", topic = %topic, "mqtt_topic_skipped");
            return;
        };
        let batch = match decode_snapshot(payload) {
            Ok(batch) => batch,
            Err(err) => {
                record_payload_undecodable();
                warn!(
                    target: "aircare.ingest",
                    channel = %channel,
                    error = %err,
                    "snapshot_undecodable"
                );
                return;
            }
        };
        debug!(
            target: "aircare.ingest",
            channel = %channel,
            records = batch.len(),
            "mqtt_snapshot_received"
        );
        for listener in self.listeners_of(&channel) {
            listener.on_batch(batch.clone());
        }
    }

    fn listeners_of(&self, channel: &ChannelName) -> Vec<Arc<dyn SnapshotListener>> {
        self.listeners
            .read()
            .map(|listeners| {
                listeners
                    .values()
                    .filter(|registration| &registration.channel == channel)
                    .map(|registration| registration.listener.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn all_listeners(&self) -> Vec<Arc<dyn SnapshotListener>> {
        self.listeners
            .read()
            .map(|listeners| {
                listeners
                    .values()
                    .map(|registration| registration.listener.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl SnapshotFeed for MqttFeed {
    async fn add_listener(
        &self,
        channel: &ChannelName,
        listener: Arc<dyn SnapshotListener>,
    ) -> Result<ListenerId, IngestError> {
        let id = ListenerId::new();
        {
            let mut listeners = self
                .listeners
                .write()
                .map_err(|_| IngestError::Source("lock failed".to_string()))?;
            listeners.insert(
                id,
                Registration {
                    channel: channel.clone(),
                    listener,
                },
            );
        }
        let topic = self.topic_for(channel);
        if let Err(err) = self
            .client
            .subscribe(topic.clone(), rumqttc::QoS::AtLeastOnce)
            .await
        {
            self.remove_listener(id);
            return Err(IngestError::Source(err.to_string()));
        }
        info!(target: "aircare.ingest", topic = %topic, listener_id = %id, "mqtt_subscribed");
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let (removed, remaining) = match self.listeners.write() {
            Ok(mut listeners) => {
                let Some(removed) = listeners.remove(&id) else {
                    return false;
                };
                let remaining = listeners
                    .values()
                    .any(|registration| registration.channel == removed.channel);
                (removed, remaining)
            }
            Err(_) => return false,
        };
        if !remaining {
            let topic = self.topic_for(&removed.channel);
            if let Err(err) = self.client.try_unsubscribe(topic.clone()) {
                warn!(target: "aircare.ingest", topic = %topic, error = %err, "mqtt_unsubscribe_failed");
            }
        }
        true
    }
}

fn channel_from_topic(prefix: &str, topic: &str) -> Option<ChannelName> {
    let prefix = prefix.trim_matches('/');
    let topic = topic.trim_matches('/');
    let rest = if prefix.is_empty() {
        topic
    } else {
        topic.strip_prefix(prefix)?.strip_prefix('/')?
    };
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some(ChannelName::new(rest))
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
