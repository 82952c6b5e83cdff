// Consistent exit codes for the folio CLI.
//
//   0 = success
//   1 = general error
//   2 = usage/argument error (e.g. no workspace)
//   3 = index file exists but cannot be parsed
//   4 = partial failure (some files failed)

use std::process;

use folio_daemon::error::IndexError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    CorruptIndex = 3,
    PartialFailure = 4,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.downcast_ref::<UsageError>().is_some() {
                return Self::Usage;
            }
            if let Some(IndexError::CorruptIndex { .. }) = cause.downcast_ref::<IndexError>() {
                return Self::CorruptIndex;
            }
        }
        Self::Error
    }

    /// Success, or partial failure when any file failed.
    pub fn for_failures(failures: usize) -> Self {
        if failures == 0 {
            Self::Success
        } else {
            Self::PartialFailure
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

/// The invocation itself is wrong (missing or invalid workspace, bad
/// arguments). Embedded in an `anyhow::Error` chain.
#[derive(Debug)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}
