pub mod log;
pub mod severity;
pub mod systime;

pub use log::log;
pub use severity::LogSeverity;
