use crate::error::{MinderError, Result};
use crate::process::{spawn, wait, Clock, ExitClass, MonotonicClock, Nap, SpawnSpec};
use nix::errno::Errno;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Deadline ending the period that starts now.
///
/// Periods are laid end to end on a fixed grid anchored at the first run,
/// so a slow run never pushes the schedule back. If a run overran one or
/// more whole periods, the grid skips ahead to the first boundary after
/// `now` instead of firing a burst of catch-up runs.
pub fn next_deadline(previous: Option<Duration>, now: Duration, period: Duration) -> Duration {
    let Some(previous) = previous else {
        return now + period;
    };

    let deadline = previous + period;
    if deadline > now {
        return deadline;
    }

    let behind = now - previous;
    let slots = behind.as_nanos() / period.as_nanos() + 1;
    let slots = u32::try_from(slots).unwrap_or(u32::MAX);
    previous + period.saturating_mul(slots)
}

/// Runs one command to completion once per period
pub struct PeriodicRunner<C: Clock = MonotonicClock> {
    spec: SpawnSpec,
    period: Duration,
    clock: C,
    /// Deadline of the previous period, if the clock was readable
    deadline: Option<Duration>,
}

impl<C: Clock> PeriodicRunner<C> {
    pub fn new(spec: SpawnSpec, period: Duration, clock: C) -> Self {
        Self {
            spec,
            period,
            clock,
            deadline: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run the command forever; returns only if waiting for it fails
    pub fn run(&mut self) -> Result<()> {
        info!(
            "running '{}' every {}s",
            self.spec.program(),
            self.period.as_secs()
        );
        loop {
            self.tick()?;
        }
    }

    /// One full period: run the command, then sleep out the rest.
    ///
    /// Returns the command's exit, or `None` if it could not be forked.
    pub fn tick(&mut self) -> Result<Option<ExitClass>> {
        self.deadline = match self.clock.now() {
            Ok(now) => Some(next_deadline(self.deadline, now, self.period)),
            Err(errno) => {
                log_clock_failure(errno);
                None
            }
        };

        let exit = self.run_command()?;

        match self.deadline {
            Some(deadline) => self.sleep_until(deadline),
            None => self.sleep_period(),
        }

        Ok(exit)
    }

    fn run_command(&self) -> Result<Option<ExitClass>> {
        let pid = match spawn(&self.spec) {
            Ok(pid) => pid,
            Err(e) => {
                error!("{}; skipping this run", e);
                return Ok(None);
            }
        };
        debug!("forked child process {} to run '{}'", pid, self.spec.program());

        let status = wait::wait_for(pid).map_err(|errno| MinderError::sys("waitpid()", errno))?;

        let exit = ExitClass::from_raw(status);
        if !exit.is_success() {
            warn!("command '{}' {}", self.spec.program(), exit);
        }
        Ok(Some(exit))
    }

    /// Sleep until `deadline`, resuming with the remainder after signals
    pub fn sleep_until(&mut self, deadline: Duration) {
        let now = match self.clock.now() {
            Ok(now) => now,
            Err(errno) => {
                log_clock_failure(errno);
                self.deadline = None;
                self.sleep_period();
                return;
            }
        };

        let mut nap = deadline.saturating_sub(now);
        loop {
            debug!("sleeping for {:8.3}s", nap.as_secs_f64());
            match self.clock.nap(nap) {
                Ok(Nap::Completed) => return,
                Ok(Nap::Interrupted(remaining)) => {
                    debug!("interrupted by signal; resuming nap...");
                    nap = remaining;
                }
                Err(errno) => {
                    error!("failed to sleep: {} (error {})", errno.desc(), errno as i32);
                    return;
                }
            }
        }
    }

    // Without a clock the best we can do is a plain full-period sleep
    fn sleep_period(&self) {
        if let Err(errno) = self.clock.pause(self.period) {
            error!("failed to sleep: {} (error {})", errno.desc(), errno as i32);
        }
    }
}

fn log_clock_failure(errno: Errno) {
    error!(
        "failed to get the current time: {} (error {})",
        errno.desc(),
        errno as i32
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::clock::testing::FakeClock;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ms(m: u64) -> Duration {
        Duration::from_millis(m)
    }

    fn sh(script: &str) -> SpawnSpec {
        SpawnSpec::new("/bin/sh", &["sh", "-c", script]).unwrap()
    }

    #[test]
    fn test_next_deadline_first_period() {
        assert_eq!(next_deadline(None, secs(100), secs(10)), secs(110));
    }

    #[test]
    fn test_next_deadline_follows_grid() {
        // run finished early; the next period starts exactly at the old deadline
        assert_eq!(next_deadline(Some(secs(110)), secs(110), secs(10)), secs(120));
    }

    #[test]
    fn test_next_deadline_after_overrun_keeps_phase() {
        // previous deadline 110, run ended at 135: next boundary on the grid is 140
        assert_eq!(next_deadline(Some(secs(110)), secs(135), secs(10)), secs(140));
        // landing exactly on a boundary moves on to the following one
        assert_eq!(next_deadline(Some(secs(110)), secs(130), secs(10)), secs(140));
    }

    #[test]
    fn test_ticks_do_not_drift() {
        let fake = FakeClock::at(secs(1000));
        // each tick reads the clock twice: at the start and after the run
        fake.advance_before_reads(&[
            ms(0),
            ms(300),
            ms(0),
            ms(700),
            ms(0),
            ms(100),
        ]);
        let mut runner = PeriodicRunner::new(sh("exit 0"), secs(5), &fake);

        for _ in 0..3 {
            let exit = runner.tick().unwrap();
            assert_eq!(exit, Some(ExitClass::NormalExit(0)));
        }

        assert_eq!(fake.now.get(), secs(1015));
        assert_eq!(*fake.naps.borrow(), vec![ms(4700), ms(4300), ms(4900)]);
    }

    #[test]
    fn test_interrupted_nap_resumes_with_remainder() {
        let fake = FakeClock::at(secs(0));
        fake.advance_before_reads(&[ms(0), ms(1000)]);
        fake.interruptions.set(1);
        let mut runner = PeriodicRunner::new(sh("exit 0"), secs(3), &fake);

        runner.tick().unwrap();

        assert_eq!(*fake.naps.borrow(), vec![ms(2000), ms(1000)]);
        assert_eq!(fake.now.get(), secs(3));
    }

    #[test]
    fn test_overrun_skips_the_nap() {
        let fake = FakeClock::at(secs(0));
        fake.advance_before_reads(&[ms(0), ms(4500)]);
        let mut runner = PeriodicRunner::new(sh("exit 0"), secs(3), &fake);

        runner.tick().unwrap();

        assert_eq!(*fake.naps.borrow(), vec![Duration::ZERO]);
    }

    #[test]
    fn test_run_after_overrun_ends_on_grid() {
        let fake = FakeClock::at(secs(100));
        // first run overruns to 135; the second finishes one second in
        fake.advance_before_reads(&[ms(0), secs(35), ms(0), secs(1)]);
        let mut runner = PeriodicRunner::new(sh("exit 0"), secs(10), &fake);

        runner.tick().unwrap();
        runner.tick().unwrap();

        // second run starts at once (135) and its period ends at 140
        assert_eq!(*fake.naps.borrow(), vec![Duration::ZERO, secs(4)]);
        assert_eq!(fake.now.get(), secs(140));
    }

    #[test]
    fn test_broken_clock_falls_back_to_fixed_sleep() {
        let fake = FakeClock::at(secs(0));
        fake.broken.set(true);
        let mut runner = PeriodicRunner::new(sh("exit 0"), secs(7), &fake);

        runner.tick().unwrap();
        runner.tick().unwrap();

        assert_eq!(fake.total_slept(), secs(14));
    }

    #[test]
    fn test_failures_are_reported_not_fatal() {
        let fake = FakeClock::at(secs(0));
        let mut runner = PeriodicRunner::new(sh("exit 4"), secs(1), &fake);
        assert_eq!(runner.tick().unwrap(), Some(ExitClass::NormalExit(4)));

        let missing = SpawnSpec::new("/nonexistent/cmd", &["cmd"]).unwrap();
        let mut runner = PeriodicRunner::new(missing, secs(1), &fake);
        assert_eq!(runner.tick().unwrap(), Some(ExitClass::ExecFailed));
    }
}
