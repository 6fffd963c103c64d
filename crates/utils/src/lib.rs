mod logger;

pub use logger::{LoggerManager, RELAY_TARGET, SUBMISSION_TARGET};
