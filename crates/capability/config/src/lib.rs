//! 应用运行配置加载。

use domain::ChannelName;
use std::env;
use std::path::PathBuf;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 快照订阅源类型。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedKind {
    /// MQTT retained 快照。
    Mqtt,
    /// 从 JSON 文件回放一次快照。
    Replay(PathBuf),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub channels: Vec<ChannelName>,
    pub feed: FeedKind,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic_prefix: String,
    pub time_offset_minutes: i32,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let channels = read_channels("AIRCARE_CHANNELS")?;
        let feed = read_feed_kind()?;
        let mqtt_host = env::var("AIRCARE_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("AIRCARE_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("AIRCARE_MQTT_USERNAME");
        let mqtt_password = read_optional("AIRCARE_MQTT_PASSWORD");
        let mqtt_topic_prefix =
            env::var("AIRCARE_MQTT_TOPIC_PREFIX").unwrap_or_else(|_| "aircare".to_string());
        let time_offset_minutes = read_offset_minutes("AIRCARE_TIME_OFFSET_MINUTES")?;

        Ok(Self {
            channels,
            feed,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_topic_prefix,
            time_offset_minutes,
        })
    }
}

/// 解析逗号分隔的通道列表：去空白、去空项、去重（保留首次出现顺序）。
pub fn parse_channels(raw: &str) -> Vec<ChannelName> {
    let mut channels: Vec<ChannelName> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        let channel = ChannelName::new(name);
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }
    channels
}

fn read_channels(key: &str) -> Result<Vec<ChannelName>, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(domain::default_channels()),
    };
    let channels = parse_channels(&value);
    if channels.is_empty() {
        return Err(ConfigError::Invalid(key.to_string(), value));
    }
    Ok(channels)
}

fn read_feed_kind() -> Result<FeedKind, ConfigError> {
    let value = env::var("AIRCARE_FEED").unwrap_or_else(|_| "mqtt".to_string());
    match value.to_ascii_lowercase().as_str() {
        "mqtt" => Ok(FeedKind::Mqtt),
        "replay" => {
            let path = read_optional("AIRCARE_REPLAY_FILE")
                .ok_or_else(|| ConfigError::Missing("AIRCARE_REPLAY_FILE".to_string()))?;
            Ok(FeedKind::Replay(PathBuf::from(path)))
        }
        _ => Err(ConfigError::Invalid("AIRCARE_FEED".to_string(), value)),
    }
}

fn read_offset_minutes(key: &str) -> Result<i32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(0),
    };
    match value.trim().parse::<i32>() {
        Ok(minutes) if minutes.abs() < 24 * 60 => Ok(minutes),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}
