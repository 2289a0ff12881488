use crate::config::inittab::InittabError;
use nix::errno::Errno;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status for bad invocation or configuration
pub const EXIT_IMPROPER: i32 = 1;

/// Exit status for a failed system call the program cannot do without
pub const EXIT_RUNTIME: i32 = 2;

/// Main error type for the minder supervisors
#[derive(Debug, Error)]
pub enum MinderError {
    // Invocation errors
    #[error("{0}")]
    InvalidArgument(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Inittab(#[from] InittabError),

    #[error("{}: no commands defined.\nWhat shall I supervise?", .0.display())]
    NoCommands(PathBuf),

    // System errors
    #[error("{call} failed: {} (error {})", .errno.desc(), errno_code(.errno))]
    Sys { call: String, errno: Errno },

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MinderError {
    /// Wrap a failed system call together with its errno
    pub fn sys(call: impl Into<String>, errno: Errno) -> Self {
        MinderError::Sys {
            call: call.into(),
            errno,
        }
    }

    /// Keep the errno of an OS-level io::Error so it is reported like any
    /// other failed system call
    pub fn from_io(call: impl Into<String>, err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => MinderError::sys(call, Errno::from_raw(code)),
            None => MinderError::Io(err),
        }
    }

    /// Process exit status a program should terminate with for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MinderError::InvalidArgument(_)
            | MinderError::ConfigError(_)
            | MinderError::InvalidConfig(_)
            | MinderError::Inittab(_)
            | MinderError::NoCommands(_) => EXIT_IMPROPER,
            MinderError::Sys { .. } | MinderError::Io(_) => EXIT_RUNTIME,
        }
    }
}

fn errno_code(errno: &Errno) -> i32 {
    *errno as i32
}

/// Result type alias for minder operations
pub type Result<T> = std::result::Result<T, MinderError>;
