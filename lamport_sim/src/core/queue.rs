use crate::core::Timestamp;
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};

/// Producer half of an [`InboundQueue`]. One clone per receiver task.
#[derive(Clone, Debug)]
pub struct QueueWriter {
  tx: Sender<Timestamp>,
}
impl QueueWriter {
  /// Never blocks. Only fails once the consumer is gone, at which point the value is dropped.
  pub fn enqueue(&self, value: Timestamp) -> bool {
    self.tx.send(value).is_ok()
  }
}

/// Unbounded multi-producer, single-consumer FIFO of received timestamps.
#[derive(Debug)]
pub struct InboundQueue {
  tx: Sender<Timestamp>,
  rx: Receiver<Timestamp>,
}
impl InboundQueue {
  pub fn new() -> InboundQueue {
    let (tx, rx) = unbounded();
    InboundQueue { tx, rx }
  }

  pub fn writer(&self) -> QueueWriter {
    QueueWriter { tx: self.tx.clone() }
  }

  pub fn enqueue(&self, value: Timestamp) {
    // We hold a receiver, so the channel cannot be disconnected.
    let _ = self.tx.send(value);
  }

  pub fn try_dequeue(&self) -> Option<Timestamp> {
    match self.rx.try_recv() {
      Ok(value) => Some(value),
      Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
    }
  }

  /// Approximate under concurrent writers.
  pub fn len(&self) -> usize {
    self.rx.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rx.is_empty()
  }
}
impl Default for InboundQueue {
  fn default() -> Self {
    InboundQueue::new()
  }
}
