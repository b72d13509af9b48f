//! The per-node runtime: connecting to the rest of the cluster, the concurrent receive and send
//! loops, the Lamport clock and the event log they produce.
//!
//! ### Nodes and Ports
//! A cluster has a fixed number of nodes, known in advance. Each [`Node`] is created with an
//! identity in `1..=num_nodes` and listens on `base_port + identity`. Everything else it needs
//! comes from a [`NodeConfig`]; nothing is global.
//!
//! ```ignore
//! let mut config = NodeConfig::default();
//! config.log_dir = "logs".into();
//! config.run_duration = Some(Duration::from_secs(60));
//! let node = Node::new(1, config)?;
//! let report = node.run().await?;
//! ```
//!
//! ### Concurrency
//! Every inbound connection gets a receiver task that reads 4-byte timestamps and pushes them into
//! the node's [`InboundQueue`]. A single event loop task drains that queue, ticks and merges the
//! [`LogicalClock`], writes the [`EventLog`] and sends on the outbound [`PeerLink`]s. The queue is
//! the only structure touched by more than one task.
//!
//! ### Stopping
//! A [`StopHandle`] is shared by all tasks of a node. It fires on request, when the configured run
//! duration elapses, or when any link breaks: losing one peer ends the whole node. Stopping is
//! idempotent and the first [`StopReason`] is the one reported.

mod clock;
mod config;
mod error;
mod event_log;
mod event_loop;
mod node;
mod peer_link;
mod queue;
mod stop;

#[rustfmt::skip]
pub use {
  clock::ClockExhausted,
  clock::LogicalClock,
  clock::Timestamp,
  config::NodeConfig,
  config::NodeId,
  config::Topology,
  error::NodeError,
  event_log::log_path,
  event_log::wall_clock,
  event_log::EventLog,
  event_log::EventRecord,
  event_log::ParseRecordError,
  event_loop::dispatch,
  event_loop::Action,
  event_loop::EventLoop,
  event_loop::LoopSettings,
  node::Node,
  node::RunReport,
  node::RATE_RANGE,
  peer_link::decode,
  peer_link::run_receiver,
  peer_link::encode,
  peer_link::LinkRole,
  peer_link::LinkState,
  peer_link::PeerLink,
  peer_link::SendError,
  peer_link::MESSAGE_SIZE,
  queue::InboundQueue,
  queue::QueueWriter,
  stop::StopHandle,
  stop::StopReason,
};
