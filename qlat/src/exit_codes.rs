#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The run finished but results are partial (connections had to be force-closed).
    Degraded = 20,

    /// Invalid CLI/config (bad flags, invalid durations, out-of-range values, etc.).
    InvalidInput = 30,

    /// Runtime error (no connection could be established, every connection failed, IO errors).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_degraded(degraded: bool) -> Self {
        if degraded {
            Self::Degraded
        } else {
            Self::Success
        }
    }
}
