use std::cmp::max;
use std::fmt;

/// Logical time as it travels on the wire: a 4-byte signed integer.
pub type Timestamp = i32;

/// The clock has no room left to advance without leaving the 4-byte wire range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockExhausted;
impl fmt::Display for ClockExhausted {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "logical clock reached {}", Timestamp::MAX)
  }
}

/// A Lamport clock. Owned by exactly one event loop and never shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalClock {
  time: Timestamp,
  rate: u32,
}
impl LogicalClock {
  pub fn new(rate: u32) -> LogicalClock {
    LogicalClock { time: 0, rate: rate }
  }

  #[cfg(test)]
  pub(crate) fn starting_at(time: Timestamp, rate: u32) -> LogicalClock {
    LogicalClock { time: time, rate: rate }
  }

  /// Fails, leaving the time untouched, once the clock sits at `Timestamp::MAX`.
  pub fn tick(&mut self) -> Result<(), ClockExhausted> {
    self.time = self.time.checked_add(1).ok_or(ClockExhausted)?;
    Ok(())
  }

  /// Lamport receive rule: jump to one past the larger of our time and the received one. Fails,
  /// leaving the time untouched, when that would pass `Timestamp::MAX`.
  pub fn merge(&mut self, received: Timestamp) -> Result<(), ClockExhausted> {
    self.time = max(self.time, received).checked_add(1).ok_or(ClockExhausted)?;
    Ok(())
  }

  pub fn time(&self) -> Timestamp {
    self.time
  }

  /// Ticks per second this node was configured with. Only ever logged.
  pub fn rate(&self) -> u32 {
    self.rate
  }
}

#[cfg(test)]
mod tests {
  use super::{ClockExhausted, LogicalClock, Timestamp};

  #[test]
  fn tick_adds_one_from_zero() {
    let mut clock = LogicalClock::new(3);
    assert_eq!(clock.time(), 0);
    for expected in 1..=50 {
      clock.tick().unwrap();
      assert_eq!(clock.time(), expected);
    }
    assert_eq!(clock.rate(), 3);
  }

  #[test]
  fn merge_takes_max_plus_one() {
    let mut clock = LogicalClock::new(1);
    clock.merge(10).unwrap();
    assert_eq!(clock.time(), 11);
    clock.merge(4).unwrap();
    assert_eq!(clock.time(), 12);
    clock.merge(12).unwrap();
    assert_eq!(clock.time(), 13);
    clock.merge(-7).unwrap();
    assert_eq!(clock.time(), 14);
  }

  #[test]
  fn merge_always_advances() {
    let mut clock = LogicalClock::new(1);
    for r in [-100, 0, 3, 3, 2, 50, 49, 1000, -1].iter() {
      let before = clock.time();
      clock.merge(*r).unwrap();
      assert_eq!(clock.time(), before.max(*r) + 1);
      assert!(clock.time() > before);
    }
  }

  #[test]
  fn tick_at_the_limit_fails_without_wrapping() {
    let mut clock = LogicalClock::starting_at(Timestamp::MAX - 1, 1);
    clock.tick().unwrap();
    assert_eq!(clock.time(), Timestamp::MAX);
    assert_eq!(clock.tick(), Err(ClockExhausted));
    assert_eq!(clock.time(), Timestamp::MAX);
  }

  #[test]
  fn merge_of_the_largest_timestamp_fails_without_wrapping() {
    let mut clock = LogicalClock::new(1);
    assert_eq!(clock.merge(Timestamp::MAX), Err(ClockExhausted));
    assert_eq!(clock.time(), 0);
    clock.merge(Timestamp::MAX - 1).unwrap();
    assert_eq!(clock.time(), Timestamp::MAX);
  }
}
