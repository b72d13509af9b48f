use lamport_sim::core::{Node, NodeConfig, StopReason};
use lamport_sim::fatal;
use std::env::args;
use std::path::PathBuf;
use std::process::exit;

const USAGE: &str = "usage: lamport-node <id> [log_dir] [clock_rate]";

fn parse_args(config: &mut NodeConfig) -> Result<u16, String> {
  let args = args().skip(1).collect::<Vec<_>>();
  if args.is_empty() || args.len() > 3 {
    return Err(USAGE.to_string());
  }
  let id = args[0].parse::<u16>().map_err(|e| format!("bad id {:?}: {}", args[0], e))?;
  if let Some(dir) = args.get(1) {
    config.log_dir = PathBuf::from(dir);
  }
  if let Some(rate) = args.get(2) {
    let rate = rate.parse::<u32>().map_err(|e| format!("bad clock rate {:?}: {}", rate, e))?;
    config.clock_rate = Some(rate);
  }
  Ok(id)
}

#[tokio::main]
async fn main() {
  let mut config = NodeConfig::default();
  let level = config.log_level;
  let id = match parse_args(&mut config) {
    Ok(id) => id,
    Err(msg) => {
      eprintln!("{}", msg);
      exit(2);
    }
  };
  let node = match Node::new(id, config) {
    Ok(node) => node,
    Err(e) => {
      fatal!(level, "{}", e);
      exit(1);
    }
  };
  println!("node {} on port {}, clock rate {}", node.id(), node.port(), node.clock_rate());
  let stop = node.stop_handle();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      stop.stop(StopReason::Requested);
    }
  });
  match node.run().await {
    Ok(report) => println!(
      "node {} stopped at logical time {}: {}",
      report.id, report.final_time, report.reason
    ),
    Err(e) => {
      fatal!(level, "{}", e);
      exit(1);
    }
  }
}
