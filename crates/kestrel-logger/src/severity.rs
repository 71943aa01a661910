use std::fmt;
use std::fmt::{Display, Formatter};

pub enum LogSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Display for LogSeverity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LogSeverity::Debug => write!(f, "DEBUG"),
            LogSeverity::Info => write!(f, "INFO"),
            LogSeverity::Warning => write!(f, "WARNING"),
            LogSeverity::Error => write!(f, "ERROR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_names_are_uppercase() {
        assert_eq!(LogSeverity::Debug.to_string(), "DEBUG");
        assert_eq!(LogSeverity::Error.to_string(), "ERROR");
    }
}
