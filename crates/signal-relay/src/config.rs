use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    // Transport settings
    pub max_message_size: usize,

    // Greeting pushed to every socket right after the upgrade
    pub greeting: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".parse().unwrap(),
            max_message_size: 64 * 1024, // 64KB
            greeting: "Well hello there, I am a WebSocket server".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SIGNAL_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }

        if let Ok(size) = std::env::var("SIGNAL_MAX_MESSAGE_SIZE") {
            config.max_message_size = size.parse()?;
        }

        if let Ok(greeting) = std::env::var("SIGNAL_GREETING") {
            config.greeting = greeting;
        }

        Ok(config)
    }

    pub fn from_toml(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_message_size == 0 {
            anyhow::bail!("max_message_size must be > 0");
        }

        Ok(())
    }
}
