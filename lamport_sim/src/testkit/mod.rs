mod logging;

#[rustfmt::skip]
pub use {
  logging::log_at,
  logging::LogLevel,
};
