// init - Bootstrap a running system from an inittab

use minder::cli::{self, InitArgs};
use minder::config::inittab::Inittab;
use minder::config::Settings;
use minder::error::{MinderError, Result};
use minder::logging;
use minder::supervisor::InittabSupervisor;
use tokio::runtime::Builder;
use tracing::{info_span, Instrument};

async fn run(args: InitArgs) -> Result<()> {
    let settings = Settings::load(args.settings.as_deref())?;
    let inittab = Inittab::load(&args.inittab)?;

    InittabSupervisor::new(&inittab, &settings.inittab)?.run().await
}

fn main() {
    let args: InitArgs = cli::parse_or_exit();
    // before the runtime exists, so fd 3 is still whatever we inherited
    logging::init();

    let result = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| MinderError::from_io("starting the runtime", e))
        .and_then(|runtime| runtime.block_on(run(args).instrument(info_span!("init"))));

    if let Err(e) = result {
        // printed bare so inittab carets line up with the offending line
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
