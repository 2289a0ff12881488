// Diagnostic output: stderr for operators, fd 3 for debug traces

use nix::fcntl::{fcntl, FcntlArg};
use std::fs::File;
use std::os::unix::io::{FromRawFd, RawFd};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Descriptor that carries debug output when the caller left it open
pub const DEBUG_FD: RawFd = 3;

// A close-on-exec duplicate of fd 3, if fd 3 is open. fd 3 itself stays
// with whoever opened it; dropping the copy only closes the copy.
fn debug_channel() -> Option<File> {
    let copy = fcntl(DEBUG_FD, FcntlArg::F_DUPFD_CLOEXEC(DEBUG_FD + 1)).ok()?;
    Some(unsafe { File::from_raw_fd(copy) })
}

/// Install the global subscriber.
///
/// stderr gets `RUST_LOG` (default `info`); when fd 3 is open it
/// additionally receives everything at `debug` and above. Calling this
/// twice is harmless.
pub fn init() {
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );

    let debug = debug_channel().map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::DEBUG)
    });

    let _ = tracing_subscriber::registry()
        .with(stderr)
        .with(debug)
        .try_init();
}
