use crate::core::{QueueWriter, StopHandle, StopReason, Timestamp};
use crate::testkit::LogLevel;
use crate::{debug, info, trace, warn};
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Every message is one big-endian `i32`: the sender's logical time. No header, no framing.
pub const MESSAGE_SIZE: usize = 4;

pub fn encode(time: Timestamp) -> [u8; MESSAGE_SIZE] {
  time.to_be_bytes()
}

pub fn decode(bytes: [u8; MESSAGE_SIZE]) -> Timestamp {
  Timestamp::from_be_bytes(bytes)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkState {
  Disconnected,
  Connecting,
  Connected,
  /// Terminal. A closed link is never reconnected.
  Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkRole {
  Outbound,
  Inbound,
}

#[derive(Debug)]
pub enum SendError {
  NotConnected,
  TimedOut,
  Io(io::Error),
}
impl SendError {
  /// What the owning node should stop with after this failure on `port`.
  pub fn stop_reason(&self, port: u16) -> StopReason {
    match self {
      SendError::TimedOut => StopReason::SendTimeout { port },
      SendError::NotConnected | SendError::Io(_) => StopReason::PeerFailure { port },
    }
  }
}

/// One directed TCP connection to a peer. Outbound links are only written, inbound links are only
/// read. For an inbound link `peer_port` is the remote end's ephemeral port, since the protocol
/// has no handshake that would name the peer.
#[derive(Debug)]
pub struct PeerLink {
  peer_port: u16,
  role: LinkRole,
  state: LinkState,
  stream: Option<TcpStream>,
}
impl PeerLink {
  pub fn outbound(peer_port: u16) -> PeerLink {
    PeerLink {
      peer_port: peer_port,
      role: LinkRole::Outbound,
      state: LinkState::Disconnected,
      stream: None,
    }
  }

  pub fn accepted(stream: TcpStream) -> PeerLink {
    let peer_port = stream.peer_addr().map(|a| a.port()).unwrap_or(0);
    let _ = stream.set_nodelay(true);
    PeerLink {
      peer_port: peer_port,
      role: LinkRole::Inbound,
      state: LinkState::Connected,
      stream: Some(stream),
    }
  }

  pub fn peer_port(&self) -> u16 {
    self.peer_port
  }

  pub fn role(&self) -> LinkRole {
    self.role
  }

  pub fn state(&self) -> LinkState {
    self.state
  }

  /// Dials `(host, peer_port)` until it answers, sleeping `retry` between attempts. There is no
  /// attempt limit; only the stop signal ends the loop early, in which case the link is closed
  /// and `false` is returned.
  pub async fn connect(
    &mut self,
    host: IpAddr,
    retry: Duration,
    stop: &StopHandle,
    level: LogLevel,
  ) -> bool {
    if self.state != LinkState::Disconnected {
      return self.state == LinkState::Connected;
    }
    let mut attempts = 0u64;
    loop {
      self.state = LinkState::Connecting;
      attempts += 1;
      let dialed = tokio::select! {
        res = TcpStream::connect((host, self.peer_port)) => res,
        _ = stop.stopped() => {
          self.state = LinkState::Closed;
          return false;
        }
      };
      match dialed {
        Ok(stream) => {
          let _ = stream.set_nodelay(true);
          self.stream = Some(stream);
          self.state = LinkState::Connected;
          info!(level, "connected to port {} after {} attempt(s)", self.peer_port, attempts);
          return true;
        }
        Err(e) => {
          self.state = LinkState::Disconnected;
          debug!(
            level,
            "connect to port {} failed ({}), retrying in {:?}",
            self.peer_port,
            e,
            retry
          );
        }
      }
      tokio::select! {
        _ = tokio::time::sleep(retry) => {}
        _ = stop.stopped() => {
          self.state = LinkState::Closed;
          return false;
        }
      }
    }
  }

  /// Writes one timestamp. Any failure closes the link.
  pub async fn send(
    &mut self,
    time: Timestamp,
    timeout: Option<Duration>,
  ) -> Result<(), SendError> {
    let stream = match (self.state, self.stream.as_mut()) {
      (LinkState::Connected, Some(stream)) => stream,
      _ => return Err(SendError::NotConnected),
    };
    let bytes = encode(time);
    let res = match timeout {
      Some(limit) => match tokio::time::timeout(limit, stream.write_all(&bytes)).await {
        Ok(res) => res.map_err(SendError::Io),
        Err(_) => Err(SendError::TimedOut),
      },
      None => stream.write_all(&bytes).await.map_err(SendError::Io),
    };
    if res.is_err() {
      self.state = LinkState::Closed;
      self.stream = None;
    }
    res
  }

  /// Reads one timestamp. `Ok(None)` means the peer closed the stream. Both that and an error
  /// leave the link closed.
  pub async fn recv(&mut self) -> io::Result<Option<Timestamp>> {
    let stream = match (self.state, self.stream.as_mut()) {
      (LinkState::Connected, Some(stream)) => stream,
      _ => return Ok(None),
    };
    let mut buf = [0u8; MESSAGE_SIZE];
    match stream.read_exact(&mut buf).await {
      Ok(_) => Ok(Some(decode(buf))),
      Err(e) => {
        self.state = LinkState::Closed;
        self.stream = None;
        if e.kind() == io::ErrorKind::UnexpectedEof {
          Ok(None)
        } else {
          Err(e)
        }
      }
    }
  }

  pub async fn close(&mut self) {
    if let Some(mut stream) = self.stream.take() {
      let _ = stream.shutdown().await;
    }
    self.state = LinkState::Closed;
  }
}

/// Body of the receiver task owning an inbound link: push every timestamp read into the node's
/// queue. End of stream or a read error stops the whole node.
pub async fn run_receiver(
  mut link: PeerLink,
  queue: QueueWriter,
  stop: StopHandle,
  level: LogLevel,
) {
  let port = link.peer_port();
  loop {
    tokio::select! {
      res = link.recv() => match res {
        Ok(Some(time)) => {
          trace!(level, "received {} from port {}", time, port);
          if !queue.enqueue(time) {
            break;
          }
        }
        Ok(None) => {
          warn!(level, "peer on port {} closed the connection", port);
          stop.stop(StopReason::PeerFailure { port });
          break;
        }
        Err(e) => {
          warn!(level, "read from port {} failed: {}", port, e);
          stop.stop(StopReason::PeerFailure { port });
          break;
        }
      },
      _ = stop.stopped() => break,
    }
  }
  link.close().await;
}
