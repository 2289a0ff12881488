use nix::errno::Errno;
use nix::libc;
use nix::sys::time::TimeSpec;
use nix::time::{clock_gettime, ClockId};
use std::time::Duration;

/// Result of one nanosleep(2) call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nap {
    Completed,
    /// A signal cut the sleep short with this much time left
    Interrupted(Duration),
}

/// Time source and sleeper used by the supervisors.
///
/// Both operations can fail; callers decide how to degrade.
pub trait Clock {
    /// Current monotonic time
    fn now(&self) -> nix::Result<Duration>;

    /// Sleep once, reporting an interruption instead of resuming
    fn nap(&self, duration: Duration) -> nix::Result<Nap>;

    /// Sleep for the whole duration, resuming after interruptions
    fn pause(&self, duration: Duration) -> nix::Result<()> {
        let mut left = duration;
        loop {
            match self.nap(left)? {
                Nap::Completed => return Ok(()),
                Nap::Interrupted(remaining) => left = remaining,
            }
        }
    }
}

/// CLOCK_MONOTONIC and nanosleep(2)
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> nix::Result<Duration> {
        clock_gettime(ClockId::CLOCK_MONOTONIC).map(Duration::from)
    }

    fn nap(&self, duration: Duration) -> nix::Result<Nap> {
        let request = TimeSpec::from(duration);
        let mut remaining: libc::timespec = unsafe { std::mem::zeroed() };

        let res = unsafe { libc::nanosleep(request.as_ref(), &mut remaining) };
        match Errno::result(res) {
            Ok(_) => Ok(Nap::Completed),
            Err(Errno::EINTR) => Ok(Nap::Interrupted(Duration::from(TimeSpec::from(remaining)))),
            Err(errno) => Err(errno),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Deterministic clock: time only moves when something sleeps or when a
    /// reading is configured to advance it.
    #[derive(Debug, Default)]
    pub struct FakeClock {
        pub now: Cell<Duration>,
        /// Time that passes before each successive `now` reading
        pub advances: RefCell<VecDeque<Duration>>,
        /// Every nap request, in order
        pub naps: RefCell<Vec<Duration>>,
        /// Number of upcoming naps to cut in half with an interruption
        pub interruptions: Cell<usize>,
        /// Make every `now` call fail
        pub broken: Cell<bool>,
    }

    impl FakeClock {
        pub fn at(start: Duration) -> Self {
            let clock = FakeClock::default();
            clock.now.set(start);
            clock
        }

        pub fn advance_before_reads(&self, advances: &[Duration]) {
            self.advances.borrow_mut().extend(advances.iter().copied());
        }

        pub fn total_slept(&self) -> Duration {
            self.naps.borrow().iter().sum()
        }
    }

    impl Clock for &FakeClock {
        fn now(&self) -> nix::Result<Duration> {
            if self.broken.get() {
                return Err(Errno::EINVAL);
            }
            let advance = self.advances.borrow_mut().pop_front().unwrap_or_default();
            self.now.set(self.now.get() + advance);
            Ok(self.now.get())
        }

        fn nap(&self, duration: Duration) -> nix::Result<Nap> {
            self.naps.borrow_mut().push(duration);
            if self.interruptions.get() > 0 {
                self.interruptions.set(self.interruptions.get() - 1);
                let slept = duration / 2;
                self.now.set(self.now.get() + slept);
                return Ok(Nap::Interrupted(duration - slept));
            }
            self.now.set(self.now.get() + duration);
            Ok(Nap::Completed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeClock;
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock;
        let first = clock.now().unwrap();
        clock.nap(Duration::from_millis(20)).unwrap();
        let second = clock.now().unwrap();
        assert!(second >= first + Duration::from_millis(20));
    }

    #[test]
    fn test_monotonic_nap_zero_returns_immediately() {
        let started = Instant::now();
        assert_eq!(MonotonicClock.nap(Duration::ZERO).unwrap(), Nap::Completed);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_pause_resumes_after_interruptions() {
        let fake = FakeClock::at(Duration::from_secs(100));
        fake.interruptions.set(2);
        let clock = &fake;

        clock.pause(Duration::from_secs(8)).unwrap();

        // 8 -> interrupted with 4 left -> interrupted with 2 left -> done
        assert_eq!(
            *fake.naps.borrow(),
            vec![
                Duration::from_secs(8),
                Duration::from_secs(4),
                Duration::from_secs(2)
            ]
        );
        assert_eq!(fake.now.get(), Duration::from_secs(108));
    }
}
