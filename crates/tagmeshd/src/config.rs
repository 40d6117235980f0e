//! TOML configuration for the tagmesh daemon.
//!
//! Every section and field is optional; a missing file or an empty one
//! yields a working single-node configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tagmesh_gossip::GossipConfig;
use tagmesh_resolver::{DEFAULT_CACHE_ENTRIES, OpenPolicy, ThresholdPolicy, VisibilityPolicy};
use tagmesh_types::Subject;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Data directory and bootstrap peers.
    pub node: NodeSection,
    /// Gossip synchronizer tuning.
    pub gossip: GossipSection,
    /// Aggregate visibility and caching.
    pub resolver: ResolverSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Directory for the ledger and key files.
    pub data_dir: PathBuf,
    /// Peers to gossip with from startup (`"endpoint-id"` or
    /// `"endpoint-id@host:port"`).
    pub peers: Vec<String>,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".tagmesh"))
            .unwrap_or_else(|| PathBuf::from(".tagmesh"));
        Self {
            data_dir,
            peers: Vec::new(),
        }
    }
}

/// `[gossip]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GossipSection {
    /// Milliseconds between gossip rounds.
    pub interval_ms: Option<u64>,
    /// Bound on one network step, in milliseconds.
    pub timeout_ms: Option<u64>,
    pub announce_limit: Option<usize>,
    pub pull_limit: Option<usize>,
    pub max_statements_per_message: Option<usize>,
    pub peers_per_round: Option<usize>,
    pub forward_fanout: Option<usize>,
    pub max_statements_per_sec: Option<u64>,
    /// Infohashes this node stores. Empty means every subject.
    pub interest: Vec<String>,
}

/// `[resolver]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    /// Distinct authors a tag needs before it is listed. Defaults to 1.
    pub min_authors: Option<usize>,
    /// Aggregates kept in memory.
    pub cache_entries: Option<usize>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Time between gossip rounds. Defaults to 10 seconds.
    pub fn gossip_interval(&self) -> Duration {
        Duration::from_millis(self.gossip.interval_ms.unwrap_or(10_000).max(1))
    }

    /// Synchronizer configuration, with defaults for unset fields.
    pub fn gossip_config(&self) -> anyhow::Result<GossipConfig> {
        let mut config = GossipConfig::default();
        let g = &self.gossip;
        if let Some(ms) = g.timeout_ms {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(n) = g.announce_limit {
            config.announce_limit = n;
        }
        if let Some(n) = g.pull_limit {
            config.pull_limit = n;
        }
        if let Some(n) = g.max_statements_per_message {
            config.max_statements_per_message = n;
        }
        if let Some(n) = g.peers_per_round {
            config.peers_per_round = n;
        }
        if let Some(n) = g.forward_fanout {
            config.forward_fanout = n;
        }
        if let Some(n) = g.max_statements_per_sec {
            config.max_statements_per_sec = n;
        }
        if !g.interest.is_empty() {
            let subjects = g
                .interest
                .iter()
                .map(|s| Subject::from_hex(s).with_context(|| format!("invalid interest {s:?}")))
                .collect::<anyhow::Result<_>>()?;
            config.interest = Some(subjects);
        }
        Ok(config)
    }

    /// Visibility policy for aggregates.
    pub fn policy(&self) -> Arc<dyn VisibilityPolicy> {
        match self.resolver.min_authors {
            Some(n) if n > 1 => Arc::new(ThresholdPolicy::new(n)),
            _ => Arc::new(OpenPolicy),
        }
    }

    /// Effective aggregate cache size.
    pub fn cache_entries(&self) -> usize {
        self.resolver.cache_entries.unwrap_or(DEFAULT_CACHE_ENTRIES)
    }
}
