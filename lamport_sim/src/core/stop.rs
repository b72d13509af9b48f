use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StopReason {
  /// Someone called [`StopHandle::stop`] from outside the node.
  Requested,
  /// [`NodeConfig::run_duration`](crate::core::NodeConfig::run_duration) ran out.
  DurationElapsed,
  /// A link to `port` hit end of stream or an I/O error.
  PeerFailure { port: u16 },
  /// A write to `port` did not finish within the send timeout.
  SendTimeout { port: u16 },
  /// The logical clock cannot advance past `Timestamp::MAX`.
  ClockExhausted,
}
impl fmt::Display for StopReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StopReason::Requested => write!(f, "stop requested"),
      StopReason::DurationElapsed => write!(f, "run duration elapsed"),
      StopReason::PeerFailure { port } => write!(f, "link to port {} failed", port),
      StopReason::SendTimeout { port } => write!(f, "send to port {} timed out", port),
      StopReason::ClockExhausted => write!(f, "logical clock exhausted"),
    }
  }
}

/// The single stop signal shared by every task of a node. The first reason recorded wins; later
/// calls to [`stop`](StopHandle::stop) change nothing.
#[derive(Clone, Debug)]
pub struct StopHandle {
  tx: Arc<watch::Sender<Option<StopReason>>>,
}
impl StopHandle {
  pub fn new() -> StopHandle {
    let (tx, _) = watch::channel(None);
    StopHandle { tx: Arc::new(tx) }
  }

  /// Returns whether this call was the one that stopped the node.
  pub fn stop(&self, reason: StopReason) -> bool {
    self.tx.send_if_modified(|current| {
      if current.is_none() {
        *current = Some(reason);
        true
      } else {
        false
      }
    })
  }

  pub fn reason(&self) -> Option<StopReason> {
    *self.tx.borrow()
  }

  pub fn is_stopped(&self) -> bool {
    self.reason().is_some()
  }

  /// Resolves once the node has been stopped, immediately if it already was.
  pub async fn stopped(&self) -> StopReason {
    let mut rx = self.tx.subscribe();
    loop {
      if let Some(reason) = *rx.borrow_and_update() {
        return reason;
      }
      if rx.changed().await.is_err() {
        return StopReason::Requested;
      }
    }
  }
}
impl Default for StopHandle {
  fn default() -> Self {
    StopHandle::new()
  }
}
