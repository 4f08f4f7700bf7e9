use serde::Deserialize;

/// Top-level configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FerryConfig {
    pub server: ServerConfig,
    pub events: EventLimits,
    pub journal: JournalConfig,
    pub sweeper: SweeperConfig,
    pub cluster: ClusterConfig,
}

/// HTTP listen address.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

/// Size limits applied to every pushed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventLimits {
    pub max_key_size: usize,
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
    pub data_dir: String,
    /// Segment size at which the journal starts a new file.
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_secs: u64,
}

/// This node's identity and its view of the cluster.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub node_id: String,
    pub leader: bool,
    pub replication_timeout_ms: u64,
    pub followers: Vec<FollowerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FollowerConfig {
    pub id: String,
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Default for EventLimits {
    fn default() -> Self {
        Self {
            max_key_size: 1024,
            max_body_size: 1024 * 1024,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: "data".to_string(),
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
            leader: true,
            replication_timeout_ms: 5000,
            followers: Vec::new(),
        }
    }
}
