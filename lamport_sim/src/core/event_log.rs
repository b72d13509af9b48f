use crate::core::{NodeError, NodeId, Timestamp};
use chrono::{Local, NaiveTime, Timelike};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const TIME_FORMAT: &str = "%H:%M:%S";

/// One observable event of a node, in the order the node saw it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventRecord {
  Initial { rate: u32 },
  Send { at: NaiveTime, clock: Timestamp },
  Receive { at: NaiveTime, queue_len: usize, clock: Timestamp },
  Internal { at: NaiveTime, clock: Timestamp },
}
impl EventRecord {
  /// Logical time carried by the record. `Initial` happens before the clock starts.
  pub fn clock(&self) -> Option<Timestamp> {
    match self {
      EventRecord::Initial { .. } => None,
      EventRecord::Send { clock, .. }
      | EventRecord::Receive { clock, .. }
      | EventRecord::Internal { clock, .. } => Some(*clock),
    }
  }

  pub fn is_receive(&self) -> bool {
    matches!(self, EventRecord::Receive { .. })
  }
}
impl fmt::Display for EventRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EventRecord::Initial { rate } => write!(f, "[Machine initialized with clock_rate: {}]", rate),
      EventRecord::Send { at, clock } => {
        write!(f, "[send_event, {}, {}]", at.format(TIME_FORMAT), clock)
      }
      EventRecord::Receive { at, queue_len, clock } => write!(
        f,
        "[receive_event, {}, {}, {}]",
        at.format(TIME_FORMAT),
        queue_len,
        clock
      ),
      EventRecord::Internal { at, clock } => {
        write!(f, "[internal_event, {}, {}]", at.format(TIME_FORMAT), clock)
      }
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseRecordError(String);
impl fmt::Display for ParseRecordError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "malformed event log line: {:?}", self.0)
  }
}
impl std::error::Error for ParseRecordError {}

impl FromStr for EventRecord {
  type Err = ParseRecordError;

  fn from_str(line: &str) -> Result<Self, Self::Err> {
    let err = || ParseRecordError(line.to_string());
    let body = line
      .trim()
      .strip_prefix('[')
      .and_then(|s| s.strip_suffix(']'))
      .ok_or_else(err)?;
    if let Some(rate) = body.strip_prefix("Machine initialized with clock_rate: ") {
      return rate.parse().map(|rate| EventRecord::Initial { rate }).map_err(|_| err());
    }
    let fields = body.split(", ").collect::<Vec<_>>();
    let at = |s: &str| NaiveTime::parse_from_str(s, TIME_FORMAT).map_err(|_| err());
    let num = |s: &str| s.parse::<Timestamp>().map_err(|_| err());
    match fields.as_slice() {
      ["send_event", t, c] => Ok(EventRecord::Send { at: at(*t)?, clock: num(*c)? }),
      ["internal_event", t, c] => Ok(EventRecord::Internal { at: at(*t)?, clock: num(*c)? }),
      ["receive_event", t, q, c] => Ok(EventRecord::Receive {
        at: at(*t)?,
        queue_len: q.parse().map_err(|_| err())?,
        clock: num(*c)?,
      }),
      _ => Err(err()),
    }
  }
}

/// Wall-clock time of observation, to the second.
pub fn wall_clock() -> NaiveTime {
  let now = Local::now().time();
  now.with_nanosecond(0).unwrap_or(now)
}

/// Path of the event log for `id` inside `dir`.
pub fn log_path(dir: &Path, id: NodeId) -> PathBuf {
  dir.join(format!("machine{}.log", id))
}

/// Append-only, line-per-event sink. Every line is flushed as soon as it is written. Write errors
/// are dropped: losing a log line must never take the event loop down.
pub struct EventLog<W: Write> {
  out: W,
  written: u64,
}
impl EventLog<File> {
  /// Creates `dir` if needed and truncates `machine{id}.log` inside it.
  pub fn open(dir: &Path, id: NodeId) -> Result<EventLog<File>, NodeError> {
    let path = log_path(dir, id);
    fs::create_dir_all(dir)
      .and_then(|_| File::create(&path))
      .map(EventLog::new)
      .map_err(|source| NodeError::LogOpen { path, source })
  }
}
impl<W: Write> EventLog<W> {
  pub fn new(out: W) -> EventLog<W> {
    EventLog { out: out, written: 0 }
  }

  pub fn record(&mut self, record: EventRecord) -> EventRecord {
    let _ = writeln!(self.out, "{}", record).and_then(|_| self.out.flush());
    self.written += 1;
    record
  }

  pub fn initial(&mut self, rate: u32) -> EventRecord {
    self.record(EventRecord::Initial { rate })
  }

  pub fn send(&mut self, clock: Timestamp) -> EventRecord {
    self.record(EventRecord::Send { at: wall_clock(), clock })
  }

  pub fn receive(&mut self, clock: Timestamp, queue_len: usize) -> EventRecord {
    self.record(EventRecord::Receive { at: wall_clock(), queue_len, clock })
  }

  pub fn internal(&mut self, clock: Timestamp) -> EventRecord {
    self.record(EventRecord::Internal { at: wall_clock(), clock })
  }

  /// Number of records handed to the log, including any whose write failed.
  pub fn written(&self) -> u64 {
    self.written
  }

  pub fn flush(&mut self) {
    let _ = self.out.flush();
  }

  pub fn into_inner(mut self) -> W {
    self.flush();
    self.out
  }
}
