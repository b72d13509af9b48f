use std::fmt;

/// Severity of a diagnostic message. A message is printed when its level is at or above the
/// threshold it is logged against, so `Off` silences everything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
  Fatal,
  Off,
}
impl LogLevel {
  pub const MIN: LogLevel = LogLevel::Trace;

  pub fn enabled(self, threshold: LogLevel) -> bool {
    threshold != LogLevel::Off && self >= threshold
  }
}
impl fmt::Display for LogLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      LogLevel::Trace => "TRACE",
      LogLevel::Debug => "DEBUG",
      LogLevel::Info => "INFO",
      LogLevel::Warn => "WARN",
      LogLevel::Error => "ERROR",
      LogLevel::Fatal => "FATAL",
      LogLevel::Off => "OFF",
    };
    f.write_str(s)
  }
}

#[doc(hidden)]
pub fn log_at(level: LogLevel, threshold: LogLevel, args: fmt::Arguments<'_>) {
  if level.enabled(threshold) {
    eprintln!("[{}] {}", level, args);
  }
}

#[macro_export]
macro_rules! trace {
  ($threshold:expr, $($arg:tt)+) => {
    $crate::testkit::log_at($crate::testkit::LogLevel::Trace, $threshold, format_args!($($arg)+))
  };
}

#[macro_export]
macro_rules! debug {
  ($threshold:expr, $($arg:tt)+) => {
    $crate::testkit::log_at($crate::testkit::LogLevel::Debug, $threshold, format_args!($($arg)+))
  };
}

#[macro_export]
macro_rules! info {
  ($threshold:expr, $($arg:tt)+) => {
    $crate::testkit::log_at($crate::testkit::LogLevel::Info, $threshold, format_args!($($arg)+))
  };
}

#[macro_export]
macro_rules! warn {
  ($threshold:expr, $($arg:tt)+) => {
    $crate::testkit::log_at($crate::testkit::LogLevel::Warn, $threshold, format_args!($($arg)+))
  };
}

#[macro_export]
macro_rules! error {
  ($threshold:expr, $($arg:tt)+) => {
    $crate::testkit::log_at($crate::testkit::LogLevel::Error, $threshold, format_args!($($arg)+))
  };
}

#[macro_export]
macro_rules! fatal {
  ($threshold:expr, $($arg:tt)+) => {
    $crate::testkit::log_at($crate::testkit::LogLevel::Fatal, $threshold, format_args!($($arg)+))
  };
}
