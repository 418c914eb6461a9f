//! Logging setup and step timing.

mod logging;
mod timer;

pub use logging::{init_logging, LogFormat, DEFAULT_LOG_FILTER};
pub use timer::SpanTimer;
