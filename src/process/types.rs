use nix::libc;
use nix::unistd::Pid;
use std::fmt;
use std::time::Duration;

/// Exit code a forked child uses when exec itself failed.
///
/// A program that genuinely exits with this code is indistinguishable from
/// a failed exec and is reported as one.
pub const EXIT_IN_CHILD: i32 = 251;

/// How a child process ended, decoded from its raw wait status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// Exited on its own with this code (never the exec sentinel)
    NormalExit(i32),
    /// Terminated by this signal number
    Signaled(i32),
    /// Exited with the exec sentinel: the target program never ran
    ExecFailed,
    /// Anything else; carries the raw status for diagnostics
    Unrecognized(i32),
}

impl ExitClass {
    /// Classify a raw status as filled in by waitpid(2). Never fails.
    pub fn from_raw(raw: i32) -> Self {
        if libc::WIFEXITED(raw) {
            match libc::WEXITSTATUS(raw) {
                EXIT_IN_CHILD => ExitClass::ExecFailed,
                code => ExitClass::NormalExit(code),
            }
        } else if libc::WIFSIGNALED(raw) {
            ExitClass::Signaled(libc::WTERMSIG(raw))
        } else {
            ExitClass::Unrecognized(raw)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitClass::NormalExit(0))
    }

    pub fn is_exec_failure(&self) -> bool {
        matches!(self, ExitClass::ExecFailed)
    }
}

impl fmt::Display for ExitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitClass::NormalExit(code) => write!(f, "exited with rc={}", code),
            ExitClass::Signaled(signal) => write!(f, "killed with signal {}", signal),
            ExitClass::ExecFailed => write!(f, "could not be executed"),
            ExitClass::Unrecognized(raw) => {
                write!(f, "died with unrecognized status of {} ({:08x})", raw, raw)
            }
        }
    }
}

/// A spawned child owned by exactly one supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildHandle {
    pub pid: Pid,
    /// Monotonic time of the spawn, if the clock could be read
    pub started_at: Option<Duration>,
}

impl ChildHandle {
    pub fn new(pid: Pid, started_at: Option<Duration>) -> Self {
        Self { pid, started_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Status words as the kernel encodes them
    fn exited(code: i32) -> i32 {
        (code & 0xff) << 8
    }

    fn signaled(signal: i32) -> i32 {
        signal & 0x7f
    }

    #[test]
    fn test_classify_normal_exit() {
        assert_eq!(ExitClass::from_raw(exited(0)), ExitClass::NormalExit(0));
        assert_eq!(ExitClass::from_raw(exited(3)), ExitClass::NormalExit(3));
        assert_eq!(ExitClass::from_raw(exited(255)), ExitClass::NormalExit(255));
        assert!(ExitClass::from_raw(exited(0)).is_success());
        assert!(!ExitClass::from_raw(exited(1)).is_success());
    }

    #[test]
    fn test_classify_sentinel_as_exec_failure() {
        let class = ExitClass::from_raw(exited(EXIT_IN_CHILD));
        assert_eq!(class, ExitClass::ExecFailed);
        assert!(class.is_exec_failure());
        assert!(!class.to_string().contains("251"));
    }

    #[test]
    fn test_classify_signaled() {
        assert_eq!(
            ExitClass::from_raw(signaled(libc::SIGKILL)),
            ExitClass::Signaled(libc::SIGKILL)
        );
        // core dump flag does not change the signal
        assert_eq!(
            ExitClass::from_raw(signaled(libc::SIGSEGV) | 0x80),
            ExitClass::Signaled(libc::SIGSEGV)
        );
    }

    #[test]
    fn test_classify_stopped_is_unrecognized() {
        let raw = 0x7f | (libc::SIGSTOP << 8);
        assert_eq!(ExitClass::from_raw(raw), ExitClass::Unrecognized(raw));
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitClass::NormalExit(4).to_string(), "exited with rc=4");
        assert_eq!(ExitClass::Signaled(9).to_string(), "killed with signal 9");
        assert_eq!(
            ExitClass::Unrecognized(0x137f).to_string(),
            "died with unrecognized status of 4991 (0000137f)"
        );
    }
}
