use itertools::Itertools;
use lamport_sim::core::{Node, NodeConfig, RunReport, StopReason, RATE_RANGE};
use lamport_sim::{error, fatal};
use rand::Rng;
use std::env::args;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

const DEFAULT_SECONDS: u64 = 60;

#[tokio::main]
async fn main() {
  let mut args = args().skip(1);
  let seconds = match args.next().map(|s| s.parse::<u64>()) {
    None => DEFAULT_SECONDS,
    Some(Ok(s)) => s,
    Some(Err(e)) => {
      eprintln!("usage: lamport-cluster [seconds] [log_dir]: {}", e);
      exit(2);
    }
  };
  let mut base = NodeConfig::default();
  if let Some(dir) = args.next() {
    base.log_dir = PathBuf::from(dir);
  }
  let level = base.log_level;

  let mut rng = rand::thread_rng();
  let mut nodes = Vec::new();
  for id in 1..=base.num_nodes {
    let mut config = base.clone();
    config.clock_rate = Some(rng.gen_range(RATE_RANGE));
    match Node::new(id, config) {
      Ok(node) => nodes.push(node),
      Err(e) => {
        fatal!(level, "node {}: {}", id, e);
        exit(1);
      }
    }
  }
  println!(
    "starting {} nodes for {}s, clock rates {}",
    nodes.len(),
    seconds,
    nodes.iter().map(|n| format!("{}={}", n.id(), n.clock_rate())).join(", ")
  );

  let stops = nodes.iter().map(|n| n.stop_handle()).collect_vec();
  let running = nodes.into_iter().map(|n| tokio::spawn(n.run())).collect_vec();
  tokio::select! {
    _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
    _ = tokio::signal::ctrl_c() => {}
  }
  for stop in stops.iter() {
    stop.stop(StopReason::Requested);
  }

  let mut reports: Vec<RunReport> = Vec::new();
  for handle in running {
    match handle.await {
      Ok(Ok(report)) => reports.push(report),
      Ok(Err(e)) => error!(level, "{}", e),
      Err(e) => error!(level, "node task failed: {}", e),
    }
  }
  for r in reports.iter().sorted_by_key(|r| r.id) {
    println!(
      "node {}: {} events, final logical time {} ({})",
      r.id, r.events, r.final_time, r.reason
    );
  }
}
