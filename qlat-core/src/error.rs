use std::time::Duration;

use crate::config::ConfigError;
use crate::engine::RunResults;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("none of {attempted} connection(s) could be established{}", format_errors(.errors))]
    ConnectFailed {
        attempted: u32,
        errors: Vec<String>,
    },

    #[error("every connection failed during the run{}", format_errors(.errors))]
    AllConnectionsFailed {
        errors: Vec<String>,
        results: Box<RunResults>,
    },

    #[error("connections did not drain within {timeout:?} ({pending} still open); results are partial")]
    ShutdownTimeout {
        timeout: Duration,
        pending: u32,
        results: Box<RunResults>,
    },

    #[error("`start` was already called on this client")]
    AlreadyStarted,

    #[error("`wait` needs a successfully started run that was not already waited on")]
    NotStarted,
}

impl Error {
    /// Partial results carried by run-time failures.
    #[must_use]
    pub fn results(&self) -> Option<&RunResults> {
        match self {
            Self::AllConnectionsFailed { results, .. } | Self::ShutdownTimeout { results, .. } => {
                Some(results)
            }
            _ => None,
        }
    }
}

fn format_errors(errors: &[String]) -> String {
    match errors.first() {
        None => String::new(),
        Some(first) if errors.len() == 1 => format!(": {first}"),
        Some(first) => format!(": {first} (and {} more)", errors.len() - 1),
    }
}
