use async_trait::async_trait;

use crate::bus::config::FollowerConfig;
use crate::error::ReplicationResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerInstance {
    pub id: String,
    pub base_url: String,
}

/// Source of follower addresses. A service-discovery backed implementation
/// plugs in here.
#[async_trait]
pub trait FollowerRegistry: Send + Sync {
    async fn instances(&self) -> ReplicationResult<Vec<FollowerInstance>>;
}

/// Followers listed in configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticFollowerRegistry {
    instances: Vec<FollowerInstance>,
}

impl StaticFollowerRegistry {
    pub fn new(instances: Vec<FollowerInstance>) -> Self {
        Self { instances }
    }

    pub fn from_config(followers: &[FollowerConfig]) -> Self {
        Self::new(
            followers
                .iter()
                .map(|f| FollowerInstance {
                    id: f.id.clone(),
                    base_url: f.base_url.clone(),
                })
                .collect(),
        )
    }
}

#[async_trait]
impl FollowerRegistry for StaticFollowerRegistry {
    async fn instances(&self) -> ReplicationResult<Vec<FollowerInstance>> {
        Ok(self.instances.clone())
    }
}
