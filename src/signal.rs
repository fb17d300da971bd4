//! Unix signal handling: `SIGHUP` triggers a config reload, `SIGUSR1`
//! reopens the log file, `SIGTERM` is a fast quit, `SIGQUIT` a graceful
//! quit that gives in-flight consumers a chance to drain.

use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};

/// What the caller's run loop should do once a signal has been handled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalAction {
    Reload,
    ReopenLog,
    QuitFast,
    QuitGraceful { drain_budget: Duration },
}

/// The drain budget a graceful quit (`SIGQUIT`) allows in-flight
/// consumers before the process exits regardless.
const GRACEFUL_QUIT_DRAIN: Duration = Duration::from_secs(3);

/// Waits for the next signal of interest and resolves it to an action.
/// Registers fresh listeners each call, matching how `tokio::signal`
/// streams are meant to be awaited in a loop rather than held open.
pub async fn next_action() -> std::io::Result<SignalAction> {
    let mut hup = signal(SignalKind::hangup())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut term = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut int = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = hup.recv() => Ok(SignalAction::Reload),
        _ = usr1.recv() => Ok(SignalAction::ReopenLog),
        _ = term.recv() => Ok(SignalAction::QuitFast),
        _ = int.recv() => Ok(SignalAction::QuitFast),
        _ = quit.recv() => Ok(SignalAction::QuitGraceful {
            drain_budget: GRACEFUL_QUIT_DRAIN,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graceful_quit_carries_a_nonzero_drain_budget() {
        let action = SignalAction::QuitGraceful {
            drain_budget: GRACEFUL_QUIT_DRAIN,
        };
        match action {
            SignalAction::QuitGraceful { drain_budget } => assert!(drain_budget.as_secs() > 0),
            _ => unreachable!(),
        }
    }
}
