// Process module - spawning, reaping and classifying child processes

pub mod clock;
pub mod restart;
pub mod spawner;
pub mod types;
pub mod wait;

pub use clock::{Clock, MonotonicClock, Nap};
pub use restart::RestartPolicy;
pub use spawner::{spawn, NullStdio, SpawnSpec};
pub use types::{ChildHandle, ExitClass, EXIT_IN_CHILD};
