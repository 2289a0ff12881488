// Thin wrappers over waitpid(2) that keep the raw status word

use nix::errno::Errno;
use nix::libc;
use nix::unistd::Pid;

fn waitpid_raw(pid: libc::pid_t, flags: libc::c_int) -> nix::Result<(libc::pid_t, i32)> {
    let mut status: libc::c_int = 0;
    loop {
        let res = unsafe { libc::waitpid(pid, &mut status, flags) };
        match Errno::result(res) {
            Ok(reaped) => return Ok((reaped, status)),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(errno),
        }
    }
}

/// Block until any child terminates
pub fn wait_any() -> nix::Result<(Pid, i32)> {
    let (pid, status) = waitpid_raw(-1, 0)?;
    Ok((Pid::from_raw(pid), status))
}

/// Block until `pid` terminates
pub fn wait_for(pid: Pid) -> nix::Result<i32> {
    let (_, status) = waitpid_raw(pid.as_raw(), 0)?;
    Ok(status)
}

/// Reap one terminated child without blocking.
///
/// `Ok(None)` means no child has terminated yet, or there are no children
/// at all.
pub fn try_wait_any() -> nix::Result<Option<(Pid, i32)>> {
    match waitpid_raw(-1, libc::WNOHANG) {
        Ok((0, _)) => Ok(None),
        Ok((pid, status)) => Ok(Some((Pid::from_raw(pid), status))),
        Err(Errno::ECHILD) => Ok(None),
        Err(errno) => Err(errno),
    }
}

/// Reap every terminated child that is ready right now
pub fn drain_terminated() -> (Vec<(Pid, i32)>, Option<Errno>) {
    let mut reaped = Vec::new();
    loop {
        match try_wait_any() {
            Ok(Some(child)) => reaped.push(child),
            Ok(None) => return (reaped, None),
            Err(errno) => return (reaped, Some(errno)),
        }
    }
}
