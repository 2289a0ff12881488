// CLI module - argument parsing for the four programs

use crate::config::inittab::DEFAULT_INITTAB;
use crate::config::parse_period;
use crate::error::{MinderError, Result, EXIT_IMPROPER};
use clap::error::ErrorKind;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// always - Run a command and restart it if it dies
#[derive(Debug, Parser)]
#[command(name = "always")]
#[command(version, about, long_about = None)]
pub struct AlwaysArgs {
    /// Settings file (.toml or .json)
    #[arg(long, env = "MINDER_SETTINGS", value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Command to run, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
    pub command: Vec<OsString>,
}

/// every - Run a command on a periodic schedule
#[derive(Debug, Parser)]
#[command(name = "every")]
#[command(version, about, long_about = None)]
pub struct EveryArgs {
    /// Period in seconds, without a unit (1-86400)
    #[arg(value_name = "N", value_parser = period_arg)]
    pub period: Duration,

    /// Command to run, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
    pub command: Vec<OsString>,
}

/// supervise - Keep every executable in the given directories running
#[derive(Debug, Parser)]
#[command(name = "supervise")]
#[command(version, about, long_about = None)]
pub struct SuperviseArgs {
    /// Settings file (.toml or .json)
    #[arg(long, env = "MINDER_SETTINGS", value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Absolute paths of the service directories
    #[arg(required = true, value_name = "DIR")]
    pub dirs: Vec<PathBuf>,
}

impl SuperviseArgs {
    /// Every directory must be absolutely qualified
    pub fn validate(&self) -> Result<()> {
        match self.dirs.iter().find(|dir| !dir.is_absolute()) {
            Some(dir) => Err(MinderError::InvalidArgument(format!(
                "{} is not an absolute path",
                dir.display()
            ))),
            None => Ok(()),
        }
    }
}

/// init - Bootstrap a running system from an inittab
#[derive(Debug, Parser)]
#[command(name = "init")]
#[command(version, about, long_about = None)]
pub struct InitArgs {
    /// Settings file (.toml or .json)
    #[arg(long, env = "MINDER_SETTINGS", value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Inittab listing the commands to supervise
    #[arg(value_name = "INITTAB", default_value = DEFAULT_INITTAB)]
    pub inittab: PathBuf,
}

fn period_arg(value: &str) -> std::result::Result<Duration, String> {
    parse_period(value).map_err(|e| e.to_string())
}

/// Parse the process arguments, exiting on bad input.
///
/// Help and version output exit 0; any other parse failure is an improper
/// invocation.
pub fn parse_or_exit<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let _ = e.print();
                std::process::exit(EXIT_IMPROPER);
            }
        },
    }
}
