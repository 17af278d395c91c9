//! Simulator configuration: JSON file plus CLI overrides.
//!
//! Example `sim.json`:
//! ```json
//! {
//!   "nodes": 5,
//!   "hop_budget": 15,
//!   "ttl_ms": 86400000,
//!   "storage_limit": 100,
//!   "message": "hello from the far end",
//!   "timeout_secs": 10
//! }
//! ```

use std::path::{Path, PathBuf};

use clap::Args;
use driftmesh_types::config::DtnSettings;
use driftmesh_types::{DriftError, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CLI overrides
// ---------------------------------------------------------------------------

/// Scenario flags. Each one overrides the config file.
#[derive(Args, Debug, Default)]
pub struct ScenarioArgs {
    /// Number of nodes in the relay line.
    #[arg(long)]
    pub nodes: Option<usize>,

    /// Initial hop budget of originated envelopes.
    #[arg(long)]
    pub hop_budget: Option<u32>,

    /// Envelope lifetime in milliseconds.
    #[arg(long)]
    pub ttl_ms: Option<i64>,

    /// Envelopes each node stores before evicting the oldest.
    #[arg(long)]
    pub storage_limit: Option<usize>,

    /// Text sent from the first node to the last.
    #[arg(long)]
    pub message: Option<String>,

    /// Seconds to wait for links and delivery.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Keep each node's store in sled under this directory instead of
    /// in memory.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub nodes: usize,
    pub hop_budget: u32,
    pub ttl_ms: i64,
    pub storage_limit: usize,
    pub message: String,
    pub timeout_secs: u64,
    pub data_dir: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        let dtn = DtnSettings::default();
        Self {
            nodes: 4,
            hop_budget: dtn.hop_budget,
            ttl_ms: dtn.ttl_ms,
            storage_limit: dtn.storage_limit,
            message: "hello across the mesh".into(),
            timeout_secs: 10,
            data_dir: None,
        }
    }
}

impl SimConfig {
    /// Loads a JSON config file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| DriftError::ConfigError {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        serde_json::from_str(&text).map_err(|e| DriftError::ConfigError {
            reason: format!("invalid config JSON: {e}"),
        })
    }

    /// Applies CLI overrides onto this config.
    pub fn merge_cli(mut self, args: &ScenarioArgs) -> Self {
        if let Some(n) = args.nodes {
            self.nodes = n;
        }
        if let Some(h) = args.hop_budget {
            self.hop_budget = h;
        }
        if let Some(t) = args.ttl_ms {
            self.ttl_ms = t;
        }
        if let Some(l) = args.storage_limit {
            self.storage_limit = l;
        }
        if let Some(ref m) = args.message {
            self.message.clone_from(m);
        }
        if let Some(t) = args.timeout_secs {
            self.timeout_secs = t;
        }
        if let Some(ref dir) = args.data_dir {
            self.data_dir = Some(dir.clone());
        }
        self
    }

    pub fn dtn_settings(&self) -> DtnSettings {
        DtnSettings {
            ttl_ms: self.ttl_ms,
            hop_budget: self.hop_budget,
            storage_limit: self.storage_limit,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes < 2 {
            return Err(DriftError::ConfigError {
                reason: "a relay line needs at least 2 nodes".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(DriftError::ConfigError {
                reason: "timeout_secs must be greater than 0".into(),
            });
        }
        self.dtn_settings().validate()
    }
}
