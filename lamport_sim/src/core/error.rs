use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop a [`Node`](crate::core::Node) from starting or finishing cleanly.
/// Log write failures never show up here, the event log swallows them.
#[derive(Debug, Error)]
pub enum NodeError {
  #[error("node identity {id} is outside 1..={num_nodes}")]
  InvalidIdentity { id: u16, num_nodes: u16 },
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),
  #[error("could not listen on port {port}: {source}")]
  Bind {
    port: u16,
    #[source]
    source: io::Error,
  },
  #[error("could not open event log {path:?}: {source}")]
  LogOpen {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error(transparent)]
  Io(#[from] io::Error),
  #[error("stopped before the cluster was fully connected")]
  Stopped,
  #[error("node task failed: {0}")]
  TaskFailed(String),
}
