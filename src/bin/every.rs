// every - Run a command on a periodic schedule

use minder::cli::{self, EveryArgs};
use minder::error::Result;
use minder::logging;
use minder::process::{MonotonicClock, NullStdio, SpawnSpec};
use minder::supervisor::PeriodicRunner;
use tracing::info_span;

fn run(args: EveryArgs) -> Result<()> {
    let spec = SpawnSpec::new(&args.command[0], &args.command)?.with_null_stdio(NullStdio::Stdin);

    PeriodicRunner::new(spec, args.period, MonotonicClock).run()
}

fn main() {
    let args: EveryArgs = cli::parse_or_exit();
    logging::init();

    let span = info_span!("every");
    let _enter = span.enter();

    if let Err(e) = run(args) {
        eprintln!("every: {}", e);
        std::process::exit(e.exit_code());
    }
}
