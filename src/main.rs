use std::path::PathBuf;
use std::process::ExitCode;

use srs::cli::{self, resolve_config_path};
use srs::{context::Context, logging, signal};

fn find_config(explicit: Option<&str>) -> Option<PathBuf> {
    resolve_config_path(explicit)
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn main() -> ExitCode {
    let args = cli::parse(std::env::args());
    let args = match args {
        Some(args) => args,
        None => return ExitCode::SUCCESS,
    };

    let config_path = match find_config(args.config_path.as_deref()) {
        Some(path) => path,
        None => {
            eprintln!("no configuration file found (tried -c, ./conf/srs.conf, /etc/srs/srs.conf)");
            return ExitCode::FAILURE;
        }
    };

    if args.test_config {
        return match Context::load(config_path) {
            Ok(_) => {
                println!("configuration ok");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", srs::error::log_trace(&e));
                ExitCode::FAILURE
            }
        };
    }

    let mut ctx = match Context::load(config_path) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{}", srs::error::log_trace(&e));
            return ExitCode::FAILURE;
        }
    };

    let handle = logging::init(ctx.conf.log_tank, ctx.conf.log_level, &ctx.conf.log_file);
    ctx.install_logging(handle);

    slog_scope::info!("srs starting"; "listen" => ?ctx.conf.listen, "vhosts" => ctx.conf.vhosts.len());

    let system = actix::System::new("srs");
    system.block_on(run(ctx));

    ExitCode::SUCCESS
}

/// The signal-driven control loop. `Source`/`Consumer` objects are plain
/// `Rc<RefCell<_>>` values owned by whichever worker attaches them, not
/// actors on a dedicated arbiter (see the Open Questions note on worker
/// runtime in `DESIGN.md`); this loop only owns the reload/reopen/quit
/// lifecycle under the single `actix::System` driving the process, per the
/// external interfaces design.
async fn run(mut ctx: Context) {
    loop {
        match signal::next_action().await {
            Ok(signal::SignalAction::Reload) => match ctx.reload() {
                Ok(()) => slog_scope::info!("reload applied"),
                Err(e) => slog_scope::error!("reload rejected"; "error" => srs::error::log_trace(&e)),
            },
            Ok(signal::SignalAction::ReopenLog) => {
                let handle = logging::reopen(ctx.conf.log_tank, ctx.conf.log_level, &ctx.conf.log_file);
                ctx.install_logging(handle);
                slog_scope::info!("log file reopened");
            }
            Ok(signal::SignalAction::QuitFast) => {
                slog_scope::info!("fast quit");
                actix::System::current().stop();
                return;
            }
            Ok(signal::SignalAction::QuitGraceful { drain_budget }) => {
                slog_scope::info!("graceful quit"; "drain_budget" => ?drain_budget);
                tokio::time::sleep(drain_budget).await;
                actix::System::current().stop();
                return;
            }
            Err(e) => {
                slog_scope::error!("signal handler failed"; "error" => %e);
                return;
            }
        }
    }
}
