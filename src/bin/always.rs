// always - Run a command and restart it if it dies

use minder::cli::{self, AlwaysArgs};
use minder::config::Settings;
use minder::error::Result;
use minder::logging;
use minder::process::{MonotonicClock, NullStdio, RestartPolicy, SpawnSpec};
use minder::supervisor::RespawnLoop;
use tracing::info_span;

fn run(args: AlwaysArgs) -> Result<()> {
    let settings = Settings::load(args.settings.as_deref())?;
    let spec = SpawnSpec::new(&args.command[0], &args.command)?.with_null_stdio(NullStdio::Stdin);

    let policy = RestartPolicy::from_settings(&settings.respawn);
    RespawnLoop::new(spec, policy, MonotonicClock).run()
}

fn main() {
    let args: AlwaysArgs = cli::parse_or_exit();
    logging::init();

    let span = info_span!("always");
    let _enter = span.enter();

    if let Err(e) = run(args) {
        eprintln!("always: {}", e);
        std::process::exit(e.exit_code());
    }
}
