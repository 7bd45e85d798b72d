use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Engine-wide settings, passed explicitly to the component constructors.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct EngineConfig {
    /// Directory the backup writer serializes objects into.
    pub backup_root: String,

    /// Identifier of the owning cluster, part of every archive filename.
    pub cluster_id: String,

    /// Number of concurrent workers per prune deletion pass.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Page size for continuation-token list calls.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Seconds to wait between the two prune deletion passes.
    #[serde(default = "default_deletion_grace_seconds")]
    pub deletion_grace_seconds: u64,

    /// Retry budget handed to the object store client.
    #[serde(default = "default_store_retries")]
    pub store_retries: u32,
}

fn default_worker_count() -> usize {
    25
}

fn default_page_size() -> u32 {
    200
}

fn default_deletion_grace_seconds() -> u64 {
    10
}

fn default_store_retries() -> u32 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backup_root: "/var/tmp/kback".to_string(),
            cluster_id: String::new(),
            worker_count: default_worker_count(),
            page_size: default_page_size(),
            deletion_grace_seconds: default_deletion_grace_seconds(),
            store_retries: default_store_retries(),
        }
    }
}
