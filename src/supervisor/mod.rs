// Supervisor module - the four supervision strategies

pub mod inittab;
pub mod periodic;
pub mod registry;
pub mod respawn;

pub use inittab::{reap_terminated, AdaptiveTick, InittabEntry, InittabSupervisor, Reaped};
pub use periodic::PeriodicRunner;
pub use registry::{ServiceEntry, ServiceIdentity, ServiceRegistry};
pub use respawn::{Generation, RespawnLoop};
