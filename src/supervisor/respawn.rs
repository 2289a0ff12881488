use crate::error::{MinderError, Result};
use crate::process::{spawn, wait, ChildHandle, Clock, ExitClass, MonotonicClock, RestartPolicy, SpawnSpec};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What happened to one generation of the supervised child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    pub child: ChildHandle,
    pub exit: ExitClass,
    /// Cooldown that was inserted before the next spawn, if any
    pub cooldown: Option<Duration>,
}

/// Keeps exactly one child running forever, throttling crash loops
pub struct RespawnLoop<C: Clock = MonotonicClock> {
    spec: SpawnSpec,
    policy: RestartPolicy,
    clock: C,
    generations: u64,
}

impl<C: Clock> RespawnLoop<C> {
    pub fn new(spec: SpawnSpec, policy: RestartPolicy, clock: C) -> Self {
        Self {
            spec,
            policy,
            clock,
            generations: 0,
        }
    }

    /// Run the supervisor loop
    ///
    /// Only returns when waiting for children fails, since the loop can no
    /// longer observe deaths after that.
    pub fn run(&mut self) -> Result<()> {
        info!("supervising '{}'", self.spec.program());
        loop {
            self.supervise_once()?;
        }
    }

    /// Spawn one generation, wait for it to die and apply restart pacing
    pub fn supervise_once(&mut self) -> Result<Generation> {
        let child = self.launch();
        let exit = self.await_death(&child)?;
        warn!("process {} {}", child.pid, exit);

        let cooldown = self.cooldown_after(&child);
        if let Some(delay) = cooldown {
            warn!(
                "process dying too quickly; waiting {} seconds to respawn...",
                delay.as_secs()
            );
            self.sleep(delay);
        }

        Ok(Generation {
            child,
            exit,
            cooldown,
        })
    }

    /// Number of children spawned so far
    pub fn generations(&self) -> u64 {
        self.generations
    }

    /// Fork the child, retrying forever while fork(2) fails
    pub fn launch(&mut self) -> ChildHandle {
        loop {
            let started_at = self.clock.now().ok();

            match spawn(&self.spec) {
                Ok(pid) => {
                    self.generations += 1;
                    debug!("forked child process {} to run '{}'", pid, self.spec.program());
                    return ChildHandle::new(pid, started_at);
                }
                Err(e) => {
                    error!("{}", e);
                    self.sleep(self.policy.fork_retry_delay());
                }
            }
        }
    }

    /// Block until `child` dies; other reaped descendants are only logged
    pub fn await_death(&self, child: &ChildHandle) -> Result<ExitClass> {
        loop {
            let (pid, status) =
                wait::wait_any().map_err(|errno| MinderError::sys("waitpid(-1)", errno))?;

            if pid == child.pid {
                return Ok(ExitClass::from_raw(status));
            }
            debug!(
                "reaped unrelated process {} ({})",
                pid,
                ExitClass::from_raw(status)
            );
        }
    }

    /// Cooldown owed after `child` died, reading the clock now
    pub fn cooldown_after(&self, child: &ChildHandle) -> Option<Duration> {
        let died = match self.clock.now() {
            Ok(now) => Some(now),
            Err(errno) => {
                error!(
                    "failed to get current time: {} (error {})",
                    errno.desc(),
                    errno as i32
                );
                None
            }
        };
        self.policy.delay_after(child.started_at, died)
    }

    fn sleep(&self, delay: Duration) {
        if let Err(errno) = self.clock.pause(delay) {
            error!("failed to sleep: {} (error {})", errno.desc(), errno as i32);
        }
    }
}
