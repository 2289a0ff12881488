use crate::error::{MinderError, Result};
use crate::process::types::EXIT_IN_CHILD;
use nix::errno::Errno;
use nix::libc;
use nix::unistd::{fork, ForkResult, Pid};
use std::ffi::{CString, OsStr};
use std::fs::{File, OpenOptions};
use std::iter;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;
use tracing::warn;

/// Which of the child's standard streams point at /dev/null
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullStdio {
    /// Keep all three streams as inherited
    None,
    /// Only stdin reads from /dev/null
    Stdin,
    /// stdin, stdout and stderr all go to /dev/null
    All,
}

/// How a program should be exec'd in the forked child.
///
/// Everything is converted to C strings up front, and [`spawn`] builds the
/// pointer arrays before forking, so the child does no allocation between
/// fork and exec.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    program: CString,
    argv: Vec<CString>,
    env: Option<Vec<CString>>,
    search_path: bool,
    null_stdio: NullStdio,
    failure_message: Vec<u8>,
}

fn to_cstring(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|_| {
        MinderError::InvalidArgument(format!(
            "'{}' contains an interior NUL byte",
            String::from_utf8_lossy(bytes)
        ))
    })
}

impl SpawnSpec {
    /// Run `program` with `args` (argv[0] included), inheriting the
    /// environment and searching PATH when `program` has no slash.
    pub fn new<S: AsRef<OsStr>>(program: impl AsRef<OsStr>, args: &[S]) -> Result<Self> {
        let program_bytes = program.as_ref().as_bytes();
        let argv = args
            .iter()
            .map(|arg| to_cstring(arg.as_ref().as_bytes()))
            .collect::<Result<Vec<_>>>()?;

        let mut failure_message = b"failed to exec '".to_vec();
        failure_message.extend_from_slice(program_bytes);
        failure_message.extend_from_slice(b"': ");

        Ok(Self {
            program: to_cstring(program_bytes)?,
            argv,
            env: None,
            search_path: true,
            null_stdio: NullStdio::None,
            failure_message,
        })
    }

    /// Run an absolute path with argv[0] set to its basename, an empty
    /// environment, and every standard stream on /dev/null
    pub fn detached(command: &Path) -> Result<Self> {
        let argv0 = command
            .file_name()
            .map(|name| name.as_bytes())
            .unwrap_or_else(|| command.as_os_str().as_bytes());

        let mut spec = Self::new(command.as_os_str(), &[OsStr::from_bytes(argv0)])?;
        spec.env = Some(Vec::new());
        spec.search_path = false;
        spec.null_stdio = NullStdio::All;
        Ok(spec)
    }

    pub fn with_null_stdio(mut self, null_stdio: NullStdio) -> Self {
        self.null_stdio = null_stdio;
        self
    }

    pub fn clear_env(mut self) -> Self {
        self.env = Some(Vec::new());
        self
    }

    pub fn program(&self) -> &str {
        self.program.to_str().unwrap_or("<non-utf8 program>")
    }

    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    pub fn env_cleared(&self) -> bool {
        self.env.is_some()
    }
}

/// Fork and exec `spec`, returning the child's pid to the parent.
///
/// If exec fails the child exits with [`EXIT_IN_CHILD`]; the parent only
/// learns about it when it reaps the child.
pub fn spawn(spec: &SpawnSpec) -> Result<Pid> {
    let argv = exec_array(&spec.argv);
    let envp = spec.env.as_deref().map(exec_array);

    let devnull = match spec.null_stdio {
        NullStdio::None => None,
        _ => match OpenOptions::new().read(true).write(true).open("/dev/null") {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("failed to open /dev/null for the child: {}", e);
                None
            }
        },
    };

    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => Ok(child),
        Ok(ForkResult::Child) => exec_child(spec, &argv, envp.as_deref(), devnull.as_ref()),
        Err(errno) => Err(MinderError::sys("fork()", errno)),
    }
}

/// Null-terminated pointer array over `strings`, as exec(3) expects.
///
/// The pointers borrow from `strings`, which must outlive the array.
fn exec_array(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(iter::once(ptr::null()))
        .collect()
}

// Runs in the forked child: only async-signal-safe calls from here on.
fn exec_child(
    spec: &SpawnSpec,
    argv: &[*const libc::c_char],
    envp: Option<&[*const libc::c_char]>,
    devnull: Option<&File>,
) -> ! {
    if let Some(devnull) = devnull {
        let fd = devnull.as_raw_fd();
        let targets: &[libc::c_int] = match spec.null_stdio {
            NullStdio::None => &[],
            NullStdio::Stdin => &[libc::STDIN_FILENO],
            NullStdio::All => &[libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO],
        };
        for &target in targets {
            unsafe {
                libc::dup2(fd, target);
            }
        }
    }

    let program = spec.program.as_ptr();
    unsafe {
        match envp {
            Some(envp) => libc::execve(program, argv.as_ptr(), envp.as_ptr()),
            None if spec.search_path => libc::execvp(program, argv.as_ptr()),
            None => libc::execv(program, argv.as_ptr()),
        };
    }
    // exec only returns on failure
    let errno = Errno::last();

    report_exec_failure(&spec.failure_message, errno);
    unsafe { libc::_exit(EXIT_IN_CHILD) }
}

fn report_exec_failure(message: &[u8], errno: Errno) {
    let desc = errno.desc().as_bytes();
    for part in [message, desc, b"\n".as_slice()] {
        unsafe {
            libc::write(libc::STDERR_FILENO, part.as_ptr().cast(), part.len());
        }
    }
}
