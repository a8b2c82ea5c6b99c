//! Domain error kinds
//!
//! These are the only errors a user ever sees verbatim. Anything else that
//! goes wrong inside a process step is an internal fault and is reported by
//! incident id only.

use thiserror::Error;

/// Filesystem and authorization errors
///
/// The `Display` text is exactly what a process prints to its terminal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OsError {
    #[error("Permission denied")]
    PermissionDenied,

    #[error("No such file or directory")]
    NotFound,

    #[error("File exists")]
    AlreadyExists,

    #[error("Is a directory")]
    IsADirectory,

    #[error("Not a directory")]
    NotADirectory,

    #[error("Directory not empty")]
    DirectoryNotEmpty,

    #[error("Cannot list contents of file")]
    CannotListFile,

    #[error("Exec format error")]
    ExecFormat,

    #[error("Device or resource busy")]
    Busy,

    #[error("No such process")]
    NoSuchProcess,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("No such user: {0}")]
    NoSuchUser(String),

    #[error("No such group: {0}")]
    NoSuchGroup(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Group already exists: {0}")]
    GroupExists(String),
}

/// Value-validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("not a number: '{0}'")]
    NotANumber(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("invalid address: '{0}'")]
    InvalidAddress(String),

    #[error("{0}")]
    Invalid(String),
}

impl ValueError {
    /// Parses a decimal integer argument and checks it against `[min, max]`
    ///
    /// Fractional input is truncated, matching how numeric arguments are
    /// accepted at the prompt (`"12.9"` reads as `12`).
    pub fn parse_in_range(raw: &str, min: i64, max: i64) -> Result<i64, ValueError> {
        let value = match raw.trim().parse::<i64>() {
            Ok(v) => v,
            Err(_) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
                .ok_or_else(|| ValueError::NotANumber(raw.to_string()))?,
        };
        if value < min || value > max {
            return Err(ValueError::OutOfRange(format!(
                "{} not in [{}, {}]",
                value, min, max
            )));
        }
        Ok(value)
    }
}
