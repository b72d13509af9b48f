use itertools::Itertools;
use lamport_sim::core::{EventRecord, Node, NodeConfig, RunReport, StopReason};
use lamport_sim::testkit::LogLevel;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const LIMIT: Duration = Duration::from_secs(20);

fn scratch_dir(name: &str) -> PathBuf {
  std::env::temp_dir().join(format!("lamport-sim-cluster-{}-{}", name, std::process::id()))
}

fn config(base_port: u16, dir: &Path) -> NodeConfig {
  let mut config = NodeConfig::default();
  config.base_port = base_port;
  config.log_dir = dir.to_path_buf();
  config.retry_interval = Duration::from_millis(25);
  config.log_level = LogLevel::Off;
  config
}

fn nodes(config: &NodeConfig) -> Vec<Node> {
  (1..=config.num_nodes)
    .map(|id| {
      let mut config = config.clone();
      config.seed = Some(id as u64);
      Node::new(id, config).unwrap()
    })
    .collect_vec()
}

fn run_all(nodes: Vec<Node>) -> Vec<JoinHandle<RunReport>> {
  nodes
    .into_iter()
    .map(|n| tokio::spawn(async move { n.run().await.unwrap() }))
    .collect_vec()
}

async fn reports(handles: Vec<JoinHandle<RunReport>>) -> Vec<RunReport> {
  let mut out = vec![];
  for h in handles {
    out.push(timeout(LIMIT, h).await.expect("node never stopped").unwrap());
  }
  out
}

async fn connect_all(nodes: Vec<Node>) -> Vec<Node> {
  let connecting = nodes
    .into_iter()
    .map(|mut n| {
      tokio::spawn(async move {
        n.connect().await.unwrap();
        n
      })
    })
    .collect_vec();
  let mut connected = vec![];
  for h in connecting {
    connected.push(timeout(LIMIT, h).await.expect("cluster never connected").unwrap());
  }
  connected
}

fn read_log(dir: &Path, id: u16) -> Vec<EventRecord> {
  fs::read_to_string(dir.join(format!("machine{}.log", id)))
    .unwrap()
    .lines()
    .map(|l| l.parse::<EventRecord>().unwrap())
    .collect_vec()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_nodes_connect_pairwise() {
  let dir = scratch_dir("connect");
  let cfg = config(41100, &dir);
  let connected = connect_all(nodes(&cfg)).await;
  assert!(connected.iter().all(|n| n.is_connected()));
  assert_eq!(connected.iter().map(|n| n.port()).collect_vec(), vec![41101, 41102, 41103]);

  for n in connected.iter() {
    n.stop_handle().stop(StopReason::Requested);
  }
  for r in reports(run_all(connected)).await {
    assert_eq!(r.reason, StopReason::Requested);
    assert_eq!(r.final_time, 0);
    assert_eq!(r.events, 1);
  }
  let _ = fs::remove_dir_all(dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timed_run_produces_causally_consistent_logs() {
  let dir = scratch_dir("timed");
  let mut cfg = config(41200, &dir);
  cfg.run_duration = Some(Duration::from_millis(300));
  let reports = reports(run_all(nodes(&cfg))).await;

  let mut receives = 0;
  for r in reports.iter() {
    assert!(matches!(
      r.reason,
      StopReason::DurationElapsed | StopReason::PeerFailure { .. }
    ));
    let records = read_log(&dir, r.id.get());
    assert_eq!(records.len() as u64, r.events);
    assert!(matches!(records[0], EventRecord::Initial { .. }));
    assert!(records[1..].iter().all(|e| e.clock().is_some()));

    let mut last = 0;
    for e in records[1..].iter() {
      let now = e.clock().unwrap();
      if e.is_receive() {
        assert!(now >= last + 2);
        receives += 1;
      } else {
        assert_eq!(now, last + 1);
      }
      last = now;
    }
    assert_eq!(last, r.final_time);
  }
  assert!(receives > 0);
  let _ = fs::remove_dir_all(dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn losing_one_peer_stops_the_others() {
  let dir = scratch_dir("fatal");
  let cfg = config(41300, &dir);
  let connected = connect_all(nodes(&cfg)).await;
  let first = connected[0].stop_handle();
  let handles = run_all(connected);
  tokio::time::sleep(Duration::from_millis(100)).await;
  first.stop(StopReason::Requested);

  let reports = reports(handles).await;
  assert_eq!(reports[0].reason, StopReason::Requested);
  for r in reports[1..].iter() {
    assert!(
      matches!(r.reason, StopReason::PeerFailure { .. }),
      "node {} stopped with {}",
      r.id,
      r.reason
    );
  }
  let _ = fs::remove_dir_all(dir);
}
