use crate::config::inittab::Inittab;
use crate::config::InittabSettings;
use crate::error::{MinderError, Result};
use crate::process::{spawn, wait, ExitClass, SpawnSpec};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// One inittab command and the pid of its current child (0 = not running)
#[derive(Debug)]
pub struct InittabEntry {
    command: PathBuf,
    spec: SpawnSpec,
    pid: AtomicI32,
}

impl InittabEntry {
    pub fn new(command: &Path) -> Result<Self> {
        Ok(Self {
            command: command.to_path_buf(),
            spec: SpawnSpec::detached(command)?,
            pid: AtomicI32::new(0),
        })
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    pub fn pid(&self) -> Option<Pid> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(Pid::from_raw(pid)),
        }
    }

    /// Whether this entry has to be (re)started: no child recorded, or the
    /// recorded child no longer accepts signals
    pub fn needs_start(&self) -> bool {
        match self.pid() {
            None => true,
            Some(pid) => kill(pid, None).is_err(),
        }
    }
}

/// A child reaped on behalf of an inittab entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    pub index: usize,
    pub pid: Pid,
    pub exit: ExitClass,
}

/// Poll interval that starts short and grows by a fixed step up to a cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveTick {
    current: Duration,
    step: Duration,
    max: Duration,
}

impl AdaptiveTick {
    pub fn new(initial: Duration, step: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            step,
            max,
        }
    }

    pub fn from_settings(settings: &InittabSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.tick_initial_ms),
            Duration::from_millis(settings.tick_step_ms),
            Duration::from_millis(settings.tick_max_ms),
        )
    }

    /// The interval to wait now; the following one is one step longer
    pub fn next(&mut self) -> Duration {
        let tick = self.current;
        self.current = (self.current + self.step).min(self.max);
        tick
    }
}

/// Reap every terminated child and match it to an entry by linear scan.
///
/// Children that match no entry (orphans handed to us) are reaped too and
/// only logged.
pub fn reap_terminated(entries: &[InittabEntry]) -> Vec<Reaped> {
    let (children, failure) = wait::drain_terminated();
    if let Some(errno) = failure {
        error!("waitpid() failed: {} (error {})", errno.desc(), errno as i32);
    }

    let mut reaped = Vec::new();
    for (pid, status) in children {
        let exit = ExitClass::from_raw(status);
        match entries.iter().position(|e| e.pid() == Some(pid)) {
            Some(index) => reaped.push(Reaped { index, pid, exit }),
            None => debug!("reaped orphan process {} ({})", pid, exit),
        }
    }
    reaped
}

async fn reap_on_sigchld(
    entries: Arc<[InittabEntry]>,
    mut sigchld: Signal,
    tx: mpsc::UnboundedSender<Reaped>,
) {
    while sigchld.recv().await.is_some() {
        for reaped in reap_terminated(&entries) {
            if tx.send(reaped).is_err() {
                return;
            }
        }
    }
}

/// Supervises every inittab command concurrently
pub struct InittabSupervisor {
    entries: Arc<[InittabEntry]>,
    tick: AdaptiveTick,
}

impl InittabSupervisor {
    pub fn new(inittab: &Inittab, settings: &InittabSettings) -> Result<Self> {
        let entries = inittab
            .commands
            .iter()
            .map(|command| InittabEntry::new(command))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            entries: entries.into(),
            tick: AdaptiveTick::from_settings(settings),
        })
    }

    pub fn entries(&self) -> &[InittabEntry] {
        &self.entries
    }

    /// Run the supervisor loop
    ///
    /// Never returns under normal operation; fails only if the SIGCHLD
    /// stream cannot be set up.
    pub async fn run(mut self) -> Result<()> {
        let sigchld = signal(SignalKind::child())
            .map_err(|e| MinderError::from_io("setting up the SIGCHLD handler", e))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(reap_on_sigchld(Arc::clone(&self.entries), sigchld, tx));

        info!("supervising {} command(s)", self.entries.len());
        loop {
            while let Ok(reaped) = rx.try_recv() {
                self.apply(&reaped);
            }
            self.start_stopped();
            sleep(self.tick.next()).await;
        }
    }

    /// Clear the entry's pid if it still refers to the reaped child
    pub fn apply(&self, reaped: &Reaped) -> bool {
        let Some(entry) = self.entries.get(reaped.index) else {
            return false;
        };

        let cleared = entry
            .pid
            .compare_exchange(reaped.pid.as_raw(), 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if cleared {
            info!(
                "pid {} `{}` {}",
                reaped.pid,
                entry.command.display(),
                reaped.exit
            );
        }
        cleared
    }

    /// Fork every entry that is not running. Returns how many were started.
    pub fn start_stopped(&self) -> usize {
        let mut started = 0;
        for entry in self.entries.iter() {
            if !entry.needs_start() {
                continue;
            }

            match spawn(&entry.spec) {
                Ok(pid) => {
                    entry.pid.store(pid.as_raw(), Ordering::SeqCst);
                    info!("pid {} `{}`", pid, entry.command.display());
                    started += 1;
                }
                Err(e) => {
                    entry.pid.store(0, Ordering::SeqCst);
                    warn!("{}", e);
                }
            }
        }
        started
    }
}
