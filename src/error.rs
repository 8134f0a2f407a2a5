use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `EpiError` and maps to other errors to
/// convert to an `EpiError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum EpiError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    /// Malformed or inconsistent parameters, detected at load or bind time.
    ConfigError(String),
    /// A runtime invariant of the simulation was broken. The run cannot continue.
    InvariantViolation(String),
    EpiError(String),
}

impl From<io::Error> for EpiError {
    fn from(error: io::Error) -> Self {
        EpiError::IoError(error)
    }
}

impl From<serde_json::Error> for EpiError {
    fn from(error: serde_json::Error) -> Self {
        EpiError::JsonError(error)
    }
}

impl From<csv::Error> for EpiError {
    fn from(error: csv::Error) -> Self {
        EpiError::CSVError(error)
    }
}

impl From<String> for EpiError {
    fn from(error: String) -> Self {
        EpiError::EpiError(error)
    }
}

impl From<&str> for EpiError {
    fn from(error: &str) -> Self {
        EpiError::EpiError(error.to_string())
    }
}

impl std::error::Error for EpiError {}

impl Display for EpiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EpiError::ConfigError(msg) => write!(f, "Configuration error: {msg}")?,
            EpiError::InvariantViolation(msg) => write!(f, "Invariant violation: {msg}")?,
            _ => write!(f, "Error: {self:?}")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::EpiError;

    #[test]
    fn display_invariant_violation() {
        let error = EpiError::InvariantViolation("person 3 infected in the future".to_string());
        assert_eq!(
            error.to_string(),
            "Invariant violation: person 3 infected in the future"
        );
    }

    #[test]
    fn from_str_wraps_message() {
        let error: EpiError = "something broke".into();
        assert!(matches!(error, EpiError::EpiError(ref msg) if msg == "something broke"));
    }
}
