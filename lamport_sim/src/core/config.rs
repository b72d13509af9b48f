use crate::core::NodeError;
use crate::testkit::LogLevel;
use itertools::Itertools;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Identity of one node in a fixed-size cluster, always in `1..=num_nodes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u16);
impl NodeId {
  pub fn new(id: u16, num_nodes: u16) -> Result<NodeId, NodeError> {
    if id == 0 || id > num_nodes {
      return Err(NodeError::InvalidIdentity { id, num_nodes });
    }
    Ok(NodeId(id))
  }

  pub fn get(&self) -> u16 {
    self.0
  }
}
impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Deterministic mapping from identities to ports. Identity `i` listens on `base_port + i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
  pub host: IpAddr,
  pub base_port: u16,
  pub num_nodes: u16,
}
impl Topology {
  pub fn port_of(&self, id: NodeId) -> u16 {
    self.base_port + id.get()
  }

  pub fn all_ports(&self) -> Vec<u16> {
    (1..=self.num_nodes).map(|i| self.base_port + i).collect_vec()
  }

  /// Every port but our own, in ascending order. Index `k - 1` of this list is "peer #k".
  pub fn peer_ports(&self, id: NodeId) -> Vec<u16> {
    let own = self.port_of(id);
    self.all_ports().into_iter().filter(|p| *p != own).sorted().collect_vec()
  }
}

/// Configures a [`Node`](crate::core::Node).
#[derive(Clone, Debug)]
pub struct NodeConfig {
  /// The address every node in the cluster listens on.
  ///
  /// default: `127.0.0.1`
  pub host: IpAddr,
  /// Node `i` listens on `base_port + i`.
  ///
  /// default: `50049`
  pub base_port: u16,
  /// The fixed number of nodes in the cluster. Identities run from 1 to this value.
  ///
  /// default: `3`
  pub num_nodes: u16,
  /// Ticks per second recorded for this node. Advisory only: it is logged, never used to pace the
  /// event loop. `None` picks a random rate in `1..=6`.
  ///
  /// default: `None`
  pub clock_rate: Option<u32>,
  /// Directory holding `machine{id}.log`. Created if missing.
  ///
  /// default: `logs`
  pub log_dir: PathBuf,
  /// How long an outbound link waits between connect attempts.
  ///
  /// default: `1 second`
  pub retry_interval: Duration,
  /// Upper bound on a single message write. Expiry is treated like a broken link. `None` lets a
  /// stalled peer block the sender forever.
  ///
  /// default: `5 seconds`
  pub send_timeout: Option<Duration>,
  /// Stop the event loop by itself once this much time has passed since it started.
  ///
  /// default: `None`
  pub run_duration: Option<Duration>,
  /// Random event codes are drawn from `1..=event_range`. Must be at least `num_nodes` so every
  /// send code is reachable.
  ///
  /// default: `10`
  pub event_range: u32,
  /// Seed for the event loop's random number generator. `None` seeds from entropy.
  ///
  /// default: `None`
  pub seed: Option<u64>,
  /// Threshold for diagnostic messages on stderr. The event log is unaffected.
  ///
  /// default: `LogLevel::Warn`
  pub log_level: LogLevel,
}
impl Default for NodeConfig {
  fn default() -> Self {
    NodeConfig {
      host: IpAddr::V4(Ipv4Addr::LOCALHOST),
      base_port: 50049,
      num_nodes: 3,
      clock_rate: None,
      log_dir: PathBuf::from("logs"),
      retry_interval: Duration::from_secs(1),
      send_timeout: Some(Duration::from_secs(5)),
      run_duration: None,
      event_range: 10,
      seed: None,
      log_level: LogLevel::Warn,
    }
  }
}
impl NodeConfig {
  pub fn topology(&self) -> Topology {
    Topology {
      host: self.host,
      base_port: self.base_port,
      num_nodes: self.num_nodes,
    }
  }

  /// Checks everything that does not depend on the node's identity.
  pub fn validate(&self) -> Result<(), NodeError> {
    if self.num_nodes < 2 {
      return Err(NodeError::InvalidConfig(format!(
        "a cluster needs at least 2 nodes, got {}",
        self.num_nodes
      )));
    }
    if self.clock_rate == Some(0) {
      return Err(NodeError::InvalidConfig("clock rate must be positive".to_string()));
    }
    if self.event_range < self.num_nodes as u32 {
      return Err(NodeError::InvalidConfig(format!(
        "event range {} cannot cover {} send codes",
        self.event_range, self.num_nodes
      )));
    }
    if self.base_port.checked_add(self.num_nodes).is_none() {
      return Err(NodeError::InvalidConfig(format!(
        "base port {} leaves no room for {} nodes",
        self.base_port, self.num_nodes
      )));
    }
    Ok(())
  }
}
