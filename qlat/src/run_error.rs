use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => e,
        }
    }
}

impl From<qlat_core::Error> for RunError {
    fn from(err: qlat_core::Error) -> Self {
        match err {
            qlat_core::Error::Config(_) => Self::InvalidInput(err.into()),
            _ => Self::RuntimeError(err.into()),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => {
                write!(f, "{e:#}")
            }
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_invalid_input() {
        let err = RunError::from(qlat_core::Error::Config(qlat_core::ConfigError::InvalidPort));
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);

        let err = RunError::from(qlat_core::Error::ConnectFailed {
            attempted: 1,
            errors: Vec::new(),
        });
        assert_eq!(err.exit_code(), ExitCode::RuntimeError);
    }
}
