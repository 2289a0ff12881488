// supervise - Keep every executable in a set of directories running

use minder::cli::{self, SuperviseArgs};
use minder::config::Settings;
use minder::error::Result;
use minder::logging;
use minder::process::MonotonicClock;
use minder::supervisor::ServiceRegistry;
use tracing::info_span;

fn run(args: SuperviseArgs) -> Result<()> {
    args.validate()?;
    let settings = Settings::load(args.settings.as_deref())?;

    ServiceRegistry::new(&settings.registry, MonotonicClock).run(&args.dirs)
}

fn main() {
    let args: SuperviseArgs = cli::parse_or_exit();
    logging::init();

    let span = info_span!("supervise");
    let _enter = span.enter();

    if let Err(e) = run(args) {
        eprintln!("supervise: {}", e);
        std::process::exit(e.exit_code());
    }
}
