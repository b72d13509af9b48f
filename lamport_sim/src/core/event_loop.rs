use crate::core::{
  EventLog, EventRecord, InboundQueue, LogicalClock, NodeConfig, PeerLink, StopHandle,
  StopReason, Timestamp,
};
use crate::testkit::LogLevel;
use crate::{trace, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;

/// What one random event code asks the loop to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
  /// Send to the peer at this index of the port-sorted peer list.
  Send(usize),
  Broadcast,
  Internal,
}

/// Code `k` in `1..=peers` targets peer `k`, code `peers + 1` targets everyone and anything else
/// stays local. With three nodes: 1 and 2 are single sends, 3 is a broadcast.
pub fn dispatch(code: u32, peers: usize) -> Action {
  let peers = peers as u32;
  if peers == 0 {
    Action::Internal
  } else if code >= 1 && code <= peers {
    Action::Send((code - 1) as usize)
  } else if code == peers + 1 {
    Action::Broadcast
  } else {
    Action::Internal
  }
}

/// The knobs of [`NodeConfig`] the event loop itself reads.
#[derive(Clone, Debug)]
pub struct LoopSettings {
  pub event_range: u32,
  pub send_timeout: Option<Duration>,
  pub run_duration: Option<Duration>,
  pub seed: Option<u64>,
  pub log_level: LogLevel,
}
impl From<&NodeConfig> for LoopSettings {
  fn from(config: &NodeConfig) -> Self {
    LoopSettings {
      event_range: config.event_range,
      send_timeout: config.send_timeout,
      run_duration: config.run_duration,
      seed: config.seed,
      log_level: config.log_level,
    }
  }
}

/// The per-node event loop. It alone touches the clock, the event log and the outbound links, so
/// none of them need a lock. The inbound queue is the only thing shared with other tasks.
pub struct EventLoop<W: Write> {
  clock: LogicalClock,
  queue: InboundQueue,
  links: Vec<PeerLink>,
  log: EventLog<W>,
  rng: SmallRng,
  stop: StopHandle,
  settings: LoopSettings,
}
impl<W: Write> EventLoop<W> {
  /// `links` must be the outbound links sorted by peer port.
  pub fn new(
    clock: LogicalClock,
    queue: InboundQueue,
    links: Vec<PeerLink>,
    log: EventLog<W>,
    stop: StopHandle,
    settings: LoopSettings,
  ) -> EventLoop<W> {
    let rng = match settings.seed {
      Some(seed) => SmallRng::seed_from_u64(seed),
      None => SmallRng::from_entropy(),
    };
    EventLoop {
      clock,
      queue,
      links,
      log,
      rng,
      stop,
      settings,
    }
  }

  pub fn clock(&self) -> &LogicalClock {
    &self.clock
  }

  pub fn queue(&self) -> &InboundQueue {
    &self.queue
  }

  pub fn log(&self) -> &EventLog<W> {
    &self.log
  }

  /// One iteration: tick, then either consume one received timestamp or originate one random
  /// event. Exactly one record is appended and returned. If the clock cannot advance any further
  /// nothing is recorded, the node is stopped with [`StopReason::ClockExhausted`] and `None` comes
  /// back.
  pub async fn step(&mut self) -> Option<EventRecord> {
    if self.clock.tick().is_err() {
      return self.exhausted();
    }
    if let Some(received) = self.queue.try_dequeue() {
      if self.clock.merge(received).is_err() {
        return self.exhausted();
      }
      let backlog = self.queue.len();
      return Some(self.log.receive(self.clock.time(), backlog));
    }
    let code = self.rng.gen_range(1..=self.settings.event_range);
    let time = self.clock.time();
    let record = match dispatch(code, self.links.len()) {
      Action::Internal => self.log.internal(time),
      Action::Send(idx) => {
        self.send_to(idx, time).await;
        self.log.send(time)
      }
      Action::Broadcast => {
        for idx in 0..self.links.len() {
          if !self.send_to(idx, time).await {
            break;
          }
        }
        self.log.send(time)
      }
    };
    Some(record)
  }

  fn exhausted(&mut self) -> Option<EventRecord> {
    warn!(self.settings.log_level, "logical clock stuck at {}", self.clock.time());
    self.stop.stop(StopReason::ClockExhausted);
    None
  }

  async fn send_to(&mut self, idx: usize, time: Timestamp) -> bool {
    let level = self.settings.log_level;
    let timeout = self.settings.send_timeout;
    let link = &mut self.links[idx];
    let port = link.peer_port();
    match link.send(time, timeout).await {
      Ok(()) => {
        trace!(level, "sent {} to port {}", time, port);
        true
      }
      Err(e) => {
        warn!(level, "send to port {} failed: {:?}", port, e);
        self.stop.stop(e.stop_reason(port));
        false
      }
    }
  }

  /// Steps until the stop signal fires or the run duration elapses, whichever comes first.
  ///
  /// Event log writes are blocking `Write` calls, flushed per line, made on the runtime worker
  /// driving this task. Run it on a multi-threaded runtime so receivers keep making progress.
  pub async fn run(mut self) -> Self {
    let deadline = self.settings.run_duration.map(|d| Instant::now() + d);
    loop {
      if self.stop.is_stopped() {
        break;
      }
      if deadline.map_or(false, |d| Instant::now() >= d) {
        self.stop.stop(StopReason::DurationElapsed);
        break;
      }
      self.step().await;
      // Rate is advisory; yielding only lets receivers and the stop signal through.
      tokio::task::yield_now().await;
    }
    self
  }

  /// Closes every outbound link and flushes the log.
  pub async fn shutdown(mut self) -> (LogicalClock, EventLog<W>) {
    for link in self.links.iter_mut() {
      link.close().await;
    }
    self.log.flush();
    (self.clock, self.log)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::EventRecord;

  fn settings(seed: u64) -> LoopSettings {
    LoopSettings {
      event_range: 10,
      send_timeout: None,
      run_duration: None,
      seed: Some(seed),
      log_level: LogLevel::Off,
    }
  }

  fn new_loop(queue: InboundQueue, seed: u64) -> EventLoop<Vec<u8>> {
    loop_at(LogicalClock::new(2), queue, StopHandle::new(), seed)
  }

  fn loop_at(
    clock: LogicalClock,
    queue: InboundQueue,
    stop: StopHandle,
    seed: u64,
  ) -> EventLoop<Vec<u8>> {
    EventLoop::new(
      clock,
      queue,
      vec![],
      EventLog::new(Vec::new()),
      stop,
      settings(seed),
    )
  }

  #[test]
  fn dispatch_for_three_nodes() {
    assert_eq!(dispatch(1, 2), Action::Send(0));
    assert_eq!(dispatch(2, 2), Action::Send(1));
    assert_eq!(dispatch(3, 2), Action::Broadcast);
    for code in 4..=10 {
      assert_eq!(dispatch(code, 2), Action::Internal);
    }
    assert_eq!(dispatch(0, 2), Action::Internal);
  }

  #[test]
  fn dispatch_without_links_is_internal() {
    for code in 1..=10 {
      assert_eq!(dispatch(code, 0), Action::Internal);
    }
  }

  #[tokio::test]
  async fn received_timestamp_is_merged_before_anything_else() {
    let mut ev = new_loop(InboundQueue::new(), 7);
    for _ in 0..3 {
      ev.step().await.unwrap();
    }
    assert_eq!(ev.clock().time(), 3);
    ev.queue().enqueue(10);
    let record = ev.step().await.unwrap();
    assert!(record.is_receive());
    assert_eq!(ev.clock().time(), 11);
    let next = ev.step().await.unwrap();
    assert!(!next.is_receive());
    assert_eq!(next.clock(), Some(12));
  }

  #[tokio::test]
  async fn queue_is_drained_one_per_step_in_order() {
    let queue = InboundQueue::new();
    for v in [40, 5, 60].iter() {
      queue.enqueue(*v);
    }
    let mut ev = new_loop(queue, 1);
    let mut times = vec![];
    let mut backlogs = vec![];
    for _ in 0..3 {
      match ev.step().await.unwrap() {
        EventRecord::Receive { clock, queue_len, .. } => {
          times.push(clock);
          backlogs.push(queue_len);
        }
        other => panic!("expected a receive, got {:?}", other),
      }
    }
    assert_eq!(times, vec![41, 43, 61]);
    assert_eq!(backlogs, vec![2, 1, 0]);
  }

  #[tokio::test]
  async fn every_step_advances_the_clock_by_at_least_one() {
    let mut ev = new_loop(InboundQueue::new(), 99);
    let mut last = 0;
    for _ in 0..200 {
      let record = ev.step().await.unwrap();
      let now = record.clock().unwrap();
      assert_eq!(now, last + 1);
      last = now;
    }
    assert_eq!(ev.log().written(), 200);
  }

  #[tokio::test]
  async fn run_stops_after_duration() {
    let mut s = settings(3);
    s.run_duration = Some(Duration::from_millis(50));
    let stop = StopHandle::new();
    let ev = EventLoop::new(
      LogicalClock::new(1),
      InboundQueue::new(),
      vec![],
      EventLog::new(Vec::new()),
      stop.clone(),
      s,
    );
    let ev = ev.run().await;
    assert_eq!(stop.reason(), Some(StopReason::DurationElapsed));
    assert!(ev.clock().time() > 0);
    let (clock, log) = ev.shutdown().await;
    assert_eq!(clock.time() as u64, log.written());
  }

  #[tokio::test]
  async fn run_returns_at_once_when_already_stopped() {
    let stop = StopHandle::new();
    stop.stop(StopReason::Requested);
    let ev = EventLoop::new(
      LogicalClock::new(1),
      InboundQueue::new(),
      vec![],
      EventLog::new(Vec::new()),
      stop,
      settings(3),
    );
    let ev = ev.run().await;
    assert_eq!(ev.clock().time(), 0);
  }

  #[tokio::test]
  async fn exhausted_clock_stops_instead_of_wrapping() {
    let stop = StopHandle::new();
    let clock = LogicalClock::starting_at(Timestamp::MAX - 1, 1);
    let mut ev = loop_at(clock, InboundQueue::new(), stop.clone(), 5);
    assert_eq!(ev.step().await.and_then(|r| r.clock()), Some(Timestamp::MAX));
    assert_eq!(ev.step().await, None);
    assert_eq!(ev.clock().time(), Timestamp::MAX);
    assert_eq!(stop.reason(), Some(StopReason::ClockExhausted));
    assert_eq!(ev.log().written(), 1);
  }

  #[tokio::test]
  async fn largest_received_timestamp_stops_the_node() {
    let stop = StopHandle::new();
    let queue = InboundQueue::new();
    queue.enqueue(Timestamp::MAX);
    let mut ev = loop_at(LogicalClock::new(1), queue, stop.clone(), 5);
    assert_eq!(ev.step().await, None);
    assert_eq!(stop.reason(), Some(StopReason::ClockExhausted));
    assert_eq!(ev.log().written(), 0);
    let ev = ev.run().await;
    assert_eq!(ev.clock().time(), 1);
  }
}
