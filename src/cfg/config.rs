// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{net::SocketAddr, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::DigestPolicy;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Identity and wire-level parameters for the target as a whole.
    pub target: TargetConfig,
    /// One or more TCP ports the target listens on.
    pub ports: Vec<PortConfig>,
    /// Implementation/runtime parameters outside the NVMe/TCP protocol.
    pub runtime: RuntimeConfig,
}

/// Target-wide identity, reported to the backend at registration time
/// (mirrors the kernel module's `nvmet_fabrics_ops` identity fields).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TargetConfig {
    #[serde(rename = "Subnqn")]
    /// NVMe Qualified Name this target answers to.
    pub subnqn: String,

    #[serde(rename = "DiscoveryAddress", default)]
    /// Address reported to hosts as the discovery-capable address, if
    /// different from the port(s) hosts actually connect to.
    pub disc_traddr: String,

    #[serde(rename = "HeaderDigest", default = "DigestPolicy::default_offered")]
    pub header_digest: DigestPolicy,
    #[serde(rename = "DataDigest", default = "DigestPolicy::default_offered")]
    pub data_digest: DigestPolicy,
}

impl DigestPolicy {
    fn default_offered() -> Self {
        DigestPolicy::Offered
    }
}

/// One listening port. A target can own several, e.g. to bind both a
/// private storage VLAN and a management-reachable address.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PortConfig {
    #[serde(rename = "Bind")]
    /// Local address to bind and listen on.
    pub bind: SocketAddr,

    #[serde(rename = "InlineDataSize", default = "PortConfig::default_inline_data_size")]
    /// Maximum write payload accepted in-capsule before falling back to
    /// r2t. Defaults to 4 pages.
    pub inline_data_size: u32,

    #[serde(rename = "ReusePort", default)]
    /// Whether to set `SO_REUSEPORT` so multiple processes (or CPU-
    /// pinned listeners within this one) can share the port.
    pub reuse_port: bool,

    #[serde(rename = "CpuSet", default)]
    /// CPU indices new queues on this port should be pinned to, round-
    /// robin. Empty means no pinning preference.
    pub cpu_set: Vec<usize>,

    #[serde(rename = "Backlog", default = "PortConfig::default_backlog")]
    pub backlog: u32,
}

impl PortConfig {
    pub const PAGE_SIZE: u32 = 4096;

    fn default_inline_data_size() -> u32 {
        4 * Self::PAGE_SIZE
    }

    fn default_backlog() -> u32 {
        128
    }
}

/// Runtime-only settings that do not map to NVMe/TCP wire keys.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    #[serde(rename = "MaxQueuesPerPort")]
    /// External limit on simultaneously live queues per port.
    pub max_queues_per_port: u32,

    #[serde(rename = "SubmissionQueueDepth")]
    /// Negotiated submission queue depth; the command-slot pool is
    /// sized `2 *` this value.
    pub submission_queue_depth: u16,

    #[serde(rename = "TimeoutConnection", with = "serde_secs")]
    /// Timeout for completing the icreq/icresp handshake.
    pub timeout_connection: Duration,
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let mut cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.target.subnqn.is_empty(), "Subnqn must not be empty");
        ensure!(!self.ports.is_empty(), "at least one port must be configured");

        for port in &mut self.ports {
            ensure!(port.inline_data_size > 0, "InlineDataSize must be > 0");
            if port.inline_data_size % PortConfig::PAGE_SIZE != 0 {
                port.inline_data_size =
                    port.inline_data_size.div_ceil(PortConfig::PAGE_SIZE) * PortConfig::PAGE_SIZE;
            }
            ensure!(port.backlog >= 1, "Backlog must be >= 1");
        }

        ensure!(self.runtime.max_queues_per_port >= 1, "MaxQueuesPerPort must be >= 1");
        ensure!(self.runtime.submission_queue_depth >= 1, "SubmissionQueueDepth must be >= 1");

        Ok(())
    }
}

/// Serde helper for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
