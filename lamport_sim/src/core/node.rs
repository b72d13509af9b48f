use crate::core::{
  run_receiver, EventLog, EventLoop, InboundQueue, LogicalClock, LoopSettings, NodeConfig,
  NodeError, NodeId, PeerLink, StopHandle, StopReason, Timestamp, Topology,
};
use crate::testkit::LogLevel;
use crate::{info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

/// Clock rates drawn when none is configured.
pub const RATE_RANGE: std::ops::RangeInclusive<u32> = 1..=6;

/// What a node did between [`Node::run`] being called and its teardown finishing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunReport {
  pub id: NodeId,
  pub final_time: Timestamp,
  /// Records appended to the event log, the initial record included.
  pub events: u64,
  pub reason: StopReason,
}

/// One simulated machine. It owns its clock, its queue, its links and its event log; none of them
/// outlive it.
pub struct Node {
  id: NodeId,
  config: NodeConfig,
  topology: Topology,
  clock: LogicalClock,
  queue: InboundQueue,
  log: EventLog<File>,
  listener: Option<TcpListener>,
  links: Vec<PeerLink>,
  receivers: JoinSet<()>,
  stop: StopHandle,
  connected: bool,
}
impl Node {
  /// Validates `id` and `config`, then opens the event log and records the initial event. Nothing
  /// touches the network until [`connect`](Node::connect). A bad identity or configuration fails
  /// before any file is created.
  pub fn new(id: u16, config: NodeConfig) -> Result<Node, NodeError> {
    config.validate()?;
    let id = NodeId::new(id, config.num_nodes)?;
    let rate = config.clock_rate.unwrap_or_else(|| pick_rate(config.seed));
    let mut log = EventLog::open(&config.log_dir, id)?;
    log.initial(rate);
    info!(config.log_level, "node {} initialized with clock rate {}", id, rate);
    Ok(Node {
      id: id,
      topology: config.topology(),
      config: config,
      clock: LogicalClock::new(rate),
      queue: InboundQueue::new(),
      log: log,
      listener: None,
      links: Vec::new(),
      receivers: JoinSet::new(),
      stop: StopHandle::new(),
      connected: false,
    })
  }

  pub fn id(&self) -> NodeId {
    self.id
  }

  pub fn port(&self) -> u16 {
    self.topology.port_of(self.id)
  }

  pub fn peer_ports(&self) -> Vec<u16> {
    self.topology.peer_ports(self.id)
  }

  pub fn clock_rate(&self) -> u32 {
    self.clock.rate()
  }

  pub fn config(&self) -> &NodeConfig {
    &self.config
  }

  /// True once every peer has dialed us and we have dialed every peer.
  pub fn is_connected(&self) -> bool {
    self.connected
  }

  pub fn stop_handle(&self) -> StopHandle {
    self.stop.clone()
  }

  /// Listens on our port and dials every peer at the same time, so two nodes never wait on each
  /// other to dial first. Each dial runs in its own task and retries forever; an unreachable peer
  /// holds up only its own link. Returns once all `N - 1` inbound connections are accepted and all
  /// `N - 1` outbound connections are up, or with [`NodeError::Stopped`] if the stop signal fires
  /// first.
  pub async fn connect(&mut self) -> Result<(), NodeError> {
    if self.connected {
      return Ok(());
    }
    let port = self.port();
    let level = self.config.log_level;
    let listener = TcpListener::bind((self.config.host, port))
      .await
      .map_err(|source| NodeError::Bind { port, source })?;
    info!(level, "node {} listening on port {}", self.id, port);

    let peers = self.peer_ports();
    let expected = peers.len();
    let mut dialers = JoinSet::new();
    for peer in peers {
      let host = self.config.host;
      let retry = self.config.retry_interval;
      let stop = self.stop.clone();
      dialers.spawn(async move {
        let mut link = PeerLink::outbound(peer);
        let up = link.connect(host, retry, &stop, level).await;
        (link, up)
      });
    }

    let stop = self.stop.clone();
    let accept = accept_peers(|| listener.accept(), expected, &stop, self.id, level);
    let dial = async {
      let mut outbound = Vec::with_capacity(expected);
      let mut failed = None;
      while let Some(res) = dialers.join_next().await {
        match res {
          Ok((link, true)) => outbound.push(link),
          Ok((_, false)) => failed = Some(NodeError::Stopped),
          Err(e) => {
            stop.stop(StopReason::Requested);
            failed = Some(NodeError::TaskFailed(e.to_string()));
          }
        }
      }
      match failed {
        Some(e) => Err(e),
        None => Ok(outbound),
      }
    };
    let (inbound, mut outbound) = match tokio::join!(accept, dial) {
      (Ok(inbound), Ok(outbound)) => (inbound, outbound),
      (Err(NodeError::Stopped), Err(e)) | (Err(e), _) | (_, Err(e)) => {
        self.stop.stop(StopReason::Requested);
        return Err(e);
      }
    };
    outbound.sort_by_key(|link| link.peer_port());
    for link in inbound {
      self.receivers.spawn(run_receiver(link, self.queue.writer(), self.stop.clone(), level));
    }
    self.links = outbound;
    self.listener = Some(listener);
    self.connected = true;
    info!(level, "node {} connected to all {} peers", self.id, expected);
    Ok(())
  }

  /// Connects if needed, runs the event loop in its own task until the node is stopped, then
  /// tears everything down: outbound links, the listener, every receiver task and the log.
  pub async fn run(mut self) -> Result<RunReport, NodeError> {
    self.connect().await?;
    let Node {
      id,
      config,
      clock,
      queue,
      log,
      listener,
      links,
      mut receivers,
      stop,
      ..
    } = self;
    let level = config.log_level;
    let settings = LoopSettings::from(&config);
    let event_loop = EventLoop::new(clock, queue, links, log, stop.clone(), settings);
    let finished = tokio::spawn(event_loop.run()).await;
    stop.stop(StopReason::Requested);
    drop(listener);
    let outcome = match finished {
      Ok(event_loop) => {
        let (clock, log) = event_loop.shutdown().await;
        Ok((clock.time(), log.written()))
      }
      Err(e) => Err(NodeError::TaskFailed(e.to_string())),
    };
    while let Some(res) = receivers.join_next().await {
      if let Err(e) = res {
        warn!(level, "receiver task of node {} failed: {}", id, e);
      }
    }
    let (final_time, events) = outcome?;
    let reason = stop.reason().unwrap_or(StopReason::Requested);
    info!(level, "node {} stopped at time {}: {}", id, final_time, reason);
    Ok(RunReport {
      id,
      final_time,
      events,
      reason,
    })
  }
}

/// Accepts `expected` inbound connections from `next`. A failed accept fires the stop signal
/// before returning, so the dialers still retrying toward absent peers give up too.
async fn accept_peers<F, Fut>(
  mut next: F,
  expected: usize,
  stop: &StopHandle,
  id: NodeId,
  level: LogLevel,
) -> Result<Vec<PeerLink>, NodeError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = io::Result<(TcpStream, SocketAddr)>>,
{
  let mut inbound = Vec::with_capacity(expected);
  while inbound.len() < expected {
    tokio::select! {
      res = next() => match res {
        Ok((stream, addr)) => {
          info!(level, "node {} accepted {}", id, addr);
          inbound.push(PeerLink::accepted(stream));
        }
        Err(e) => {
          warn!(level, "node {} failed to accept a peer: {}", id, e);
          stop.stop(StopReason::Requested);
          return Err(NodeError::Io(e));
        }
      },
      _ = stop.stopped() => return Err(NodeError::Stopped),
    }
  }
  Ok(inbound)
}

fn pick_rate(seed: Option<u64>) -> u32 {
  match seed {
    Some(seed) => SmallRng::seed_from_u64(seed).gen_range(RATE_RANGE),
    None => rand::thread_rng().gen_range(RATE_RANGE),
  }
}
