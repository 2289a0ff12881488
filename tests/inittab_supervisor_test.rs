// Integration test for inittab loading and supervision
//
// Only test_entries_restart_after_death forks; it reaps with waitpid(-1).

use minder::config::inittab::{Inittab, InittabError};
use minder::config::InittabSettings;
use minder::error::MinderError;
use minder::process::ExitClass;
use minder::supervisor::{reap_terminated, InittabEntry, InittabSupervisor, Reaped};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn write_inittab(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("inittab");
    fs::write(&path, contents).unwrap();
    path
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn reap_for(entries: &[InittabEntry], want: usize) -> Vec<Reaped> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut reaped = Vec::new();
    while reaped.len() < want && Instant::now() < deadline {
        reaped.extend(reap_terminated(entries));
        thread::sleep(Duration::from_millis(20));
    }
    reaped
}

#[test]
fn test_load_inittab_with_comments() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_inittab(
        temp_dir.path(),
        "# system services\n\n/sbin/getty\n   \n/usr/sbin/sshd\n",
    );

    let inittab = Inittab::load(&path).unwrap();
    assert_eq!(
        inittab.commands,
        vec![PathBuf::from("/sbin/getty"), PathBuf::from("/usr/sbin/sshd")]
    );
}

#[test]
fn test_relative_command_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_inittab(temp_dir.path(), "/sbin/getty\nsbin/sshd\n");

    let err = Inittab::load(&path).unwrap_err();
    assert_eq!(err.exit_code(), 1);
    match err {
        MinderError::Inittab(InittabError::NotAbsolute { line, text, .. }) => {
            assert_eq!(line, 2);
            assert_eq!(text, "sbin/sshd");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_suspicious_command_points_at_problem() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_inittab(temp_dir.path(), "/sbin/getty tty1\n");

    let err = Inittab::load(&path).unwrap_err();
    let message = err.to_string();
    let lines: Vec<&str> = message.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("command '/sbin/getty tty1' looks suspicious"));

    // the caret sits under the space after "getty"
    let caret = lines[1].find('^').unwrap();
    assert_eq!(&lines[0][caret..caret + 1], " ");
    assert_eq!(&lines[0][caret - 5..caret], "getty");
}

#[test]
fn test_empty_inittab_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_inittab(temp_dir.path(), "# nothing to run\n");

    let err = Inittab::load(&path).unwrap_err();
    assert!(matches!(err, MinderError::NoCommands(_)));
    assert!(err.to_string().contains("What shall I supervise?"));
}

#[test]
fn test_missing_inittab() {
    let temp_dir = TempDir::new().unwrap();

    let err = Inittab::load(&temp_dir.path().join("absent")).unwrap_err();
    assert!(matches!(
        err,
        MinderError::Inittab(InittabError::Unreadable { .. })
    ));
}

#[test]
fn test_entries_restart_after_death() {
    let temp_dir = TempDir::new().unwrap();
    let getty = temp_dir.path().join("getty");
    let sshd = temp_dir.path().join("sshd");
    write_script(&getty, "exec /bin/sleep 30");
    write_script(&sshd, "exec /bin/sleep 30");

    let path = write_inittab(
        temp_dir.path(),
        &format!("{}\n{}\n", getty.display(), sshd.display()),
    );
    let inittab = Inittab::load(&path).unwrap();
    let supervisor = InittabSupervisor::new(&inittab, &InittabSettings::default()).unwrap();

    // a command that cannot be executed dies with the exec failure class
    let missing = Inittab {
        path: path.clone(),
        commands: vec![PathBuf::from("/nonexistent/daemon")],
    };
    let broken = InittabSupervisor::new(&missing, &InittabSettings::default()).unwrap();
    assert_eq!(broken.start_stopped(), 1);
    let failed = reap_for(broken.entries(), 1);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].exit, ExitClass::ExecFailed);
    assert!(broken.apply(&failed[0]));
    assert!(broken.entries()[0].needs_start());

    assert_eq!(supervisor.start_stopped(), 2);
    assert_eq!(supervisor.start_stopped(), 0);

    let entries = supervisor.entries();
    let getty_pid = entries[0].pid().unwrap();
    let sshd_pid = entries[1].pid().unwrap();
    assert_ne!(getty_pid, sshd_pid);

    kill(getty_pid, Signal::SIGKILL).unwrap();
    let reaped = reap_for(entries, 1);
    assert_eq!(
        reaped,
        vec![Reaped {
            index: 0,
            pid: getty_pid,
            exit: ExitClass::Signaled(9),
        }]
    );

    assert!(supervisor.apply(&reaped[0]));
    assert_eq!(entries[0].pid(), None);
    assert_eq!(entries[1].pid(), Some(sshd_pid));

    // only the dead entry is started again
    assert_eq!(supervisor.start_stopped(), 1);
    let new_getty = entries[0].pid().unwrap();
    assert_ne!(new_getty, getty_pid);
    assert_eq!(entries[1].pid(), Some(sshd_pid));

    let pids: Vec<Pid> = entries.iter().filter_map(|e| e.pid()).collect();
    for pid in &pids {
        kill(*pid, Signal::SIGKILL).unwrap();
    }
    assert_eq!(reap_for(entries, pids.len()).len(), pids.len());
}
