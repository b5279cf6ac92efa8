//! Gateway state snapshots.
//!
//! The save hook wired by the binary. Each fire writes the current gateway
//! state as JSON to `<persistence dir>/gateway-state.json`, going through a
//! temporary file and a rename so readers never see a partial write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::error::SaveError;
use crate::http::health::{tunnel_statuses, GatewayStats, TunnelStatus};
use crate::persistence::scheduler::{SaveFuture, SaveHook};
use crate::security::RateLimiter;

pub const SNAPSHOT_FILE: &str = "gateway-state.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySnapshot {
    pub saved_at_unix: u64,
    pub server: String,
    pub version: String,
    pub uptime_secs: u64,
    pub requests_served: u64,
    pub rate_limit_clients: usize,
    pub tunnels: BTreeMap<String, TunnelStatus>,
}

/// Writes [`GatewaySnapshot`]s into a directory.
#[derive(Clone)]
pub struct SnapshotSaver {
    dir: PathBuf,
    config: Arc<GatewayConfig>,
    stats: Arc<GatewayStats>,
    limiter: Option<Arc<RateLimiter>>,
}

impl SnapshotSaver {
    pub fn new(
        config: Arc<GatewayConfig>,
        stats: Arc<GatewayStats>,
        limiter: Option<Arc<RateLimiter>>,
    ) -> Self {
        Self {
            dir: config.persistence.dir.clone(),
            config,
            stats,
            limiter,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            saved_at_unix: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            server: self.config.network.server_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.stats.uptime().as_secs(),
            requests_served: self.stats.requests_served(),
            rate_limit_clients: self
                .limiter
                .as_ref()
                .map(|l| l.tracked_clients())
                .unwrap_or(0),
            tunnels: tunnel_statuses(&self.config.tunnels),
        }
    }

    pub async fn write(&self) -> Result<PathBuf, SaveError> {
        let bytes = serde_json::to_vec_pretty(&self.snapshot())?;
        let path = self.path();
        // Unique per write: overlapping saves must not share a temp file.
        let tmp = self
            .dir
            .join(format!("{SNAPSHOT_FILE}.{:016x}.tmp", rand::random::<u64>()));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_error(&self.dir, e))?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| write_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| write_error(&path, e))?;

        tracing::debug!(path = ?path, bytes = bytes.len(), "Gateway snapshot written");
        Ok(path)
    }
}

impl SaveHook for SnapshotSaver {
    fn save(&self) -> SaveFuture {
        let saver = self.clone();
        Box::pin(async move { saver.write().await.map(|_| ()) })
    }
}

fn write_error(path: &Path, source: std::io::Error) -> SaveError {
    SaveError::Write {
        path: path.to_path_buf(),
        source,
    }
}
