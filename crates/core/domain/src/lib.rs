pub mod data;

pub use data::{Point, RawRecord, Series};

use serde::{Deserialize, Serialize};
use std::fmt;

/// 温度通道名。
pub const TEMPERATURE: &str = "temperature";
/// 湿度通道名。
pub const HUMIDITY: &str = "humidity";

/// 通道标识：一个独立订阅、一条独立曲线。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ChannelName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 默认监视的通道（温度、湿度）。
pub fn default_channels() -> Vec<ChannelName> {
    vec![ChannelName::new(TEMPERATURE), ChannelName::new(HUMIDITY)]
}
