// Library exports for the minder supervision toolkit

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod supervisor;
