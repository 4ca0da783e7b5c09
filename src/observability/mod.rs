//! Structured logging setup and span helpers

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

pub use logging::{step_span, task_span};
