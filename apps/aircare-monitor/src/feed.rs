//! 订阅源装配
//!
//! 按配置构建快照订阅源：
//! - `mqtt`：连接 broker，事件循环在独立任务中常驻；
//! - `replay`：读取 JSON 文件 `{ "<channel>": <snapshot>, ... }`，一次性写入内存订阅源。

use aircare_config::{AppConfig, FeedKind};
use aircare_ingest::{
    InMemoryFeed, IngestError, MqttFeed, MqttFeedConfig, SnapshotFeed, decode_snapshot_value,
};
use domain::{ChannelName, RawRecord};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct BuiltFeed {
    pub feed: Arc<dyn SnapshotFeed>,
    /// 订阅源驱动任务（仅 MQTT）。
    pub driver: Option<JoinHandle<Result<(), IngestError>>>,
}

pub fn build_feed(config: &AppConfig) -> Result<BuiltFeed, IngestError> {
    match &config.feed {
        FeedKind::Mqtt => {
            let mqtt = Arc::new(MqttFeed::new(MqttFeedConfig {
                host: config.mqtt_host.clone(),
                port: config.mqtt_port,
                username: config.mqtt_username.clone(),
                password: config.mqtt_password.clone(),
                topic_prefix: config.mqtt_topic_prefix.clone(),
            }));
            let runner = mqtt.clone();
            let driver = tokio::spawn(async move { runner.run().await });
            info!(
                target: "aircare.app",
                host = %config.mqtt_host,
                port = config.mqtt_port,
                topic_prefix = %config.mqtt_topic_prefix,
                "mqtt_feed_started"
            );
            Ok(BuiltFeed {
                feed: mqtt,
                driver: Some(driver),
            })
        }
        FeedKind::Replay(path) => {
            let memory = InMemoryFeed::new();
            for (channel, records) in load_replay(path)? {
                info!(
                    target: "aircare.app",
                    channel = %channel,
                    records = records.len(),
                    "replay_snapshot_loaded"
                );
                memory.publish(channel, records)?;
            }
            Ok(BuiltFeed {
                feed: Arc::new(memory),
                driver: None,
            })
        }
    }
}

fn load_replay(path: &Path) -> Result<Vec<(ChannelName, Vec<RawRecord>)>, IngestError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| IngestError::Source(format!("{}: {}", path.display(), err)))?;
    parse_replay(&content)
}

fn parse_replay(content: &str) -> Result<Vec<(ChannelName, Vec<RawRecord>)>, IngestError> {
    let root: Value =
        serde_json::from_str(content).map_err(|err| IngestError::Decode(err.to_string()))?;
    let Value::Object(channels) = root else {
        return Err(IngestError::Decode(
            "replay file must be an object keyed by channel".to_string(),
        ));
    };
    channels
        .into_iter()
        .map(|(channel, snapshot)| Ok((ChannelName::new(channel), decode_snapshot_value(snapshot)?)))
        .collect()
}
