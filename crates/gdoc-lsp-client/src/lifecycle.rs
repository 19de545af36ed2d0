//! Process termination with a grace period.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::launch::{PROCESS_TARGET, ServerExit, ServerProcess};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a termination attempt ended.
#[derive(Debug)]
pub(crate) enum Termination {
    /// The process exited on its own within the grace period.
    Exited(ServerExit),
    /// The process was killed after the grace period or an interrupt.
    Killed,
    /// The kill signal could not be delivered.
    KillFailed(io::Error),
}

/// Waits up to `grace` for the process to exit, then kills it.
///
/// Setting `interrupt` ends the wait early. The process is reaped before
/// returning unless the kill itself fails.
pub(crate) fn terminate(
    process: &mut dyn ServerProcess,
    grace: Duration,
    interrupt: &AtomicBool,
) -> Termination {
    let deadline = Instant::now() + grace;
    loop {
        match process.try_wait() {
            Ok(Some(status)) => {
                debug!(target: PROCESS_TARGET, code = ?status.code, "language server exited");
                return Termination::Exited(status);
            }
            Ok(None) => {}
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    %error,
                    "failed to check process status, killing"
                );
                break;
            }
        }
        if interrupt.load(Ordering::SeqCst) {
            debug!(target: PROCESS_TARGET, "termination interrupted, killing");
            break;
        }
        let now = Instant::now();
        if now >= deadline {
            warn!(
                target: PROCESS_TARGET,
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "language server did not exit within grace period, killing"
            );
            break;
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }

    kill(process)
}

fn kill(process: &mut dyn ServerProcess) -> Termination {
    match process.kill() {
        Ok(()) => {
            if let Err(error) = process.wait() {
                warn!(target: PROCESS_TARGET, %error, "failed to reap killed process");
            }
            Termination::Killed
        }
        // The process may have exited between the last poll and the kill.
        Err(error) => match process.try_wait() {
            Ok(Some(status)) => Termination::Exited(status),
            Ok(None) | Err(_) => Termination::KillFailed(error),
        },
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    /// Scripted process: exits after a number of polls, optionally refusing
    /// to be killed.
    struct ScriptedProcess {
        polls_until_exit: Option<usize>,
        polls: usize,
        kill_fails: bool,
        kills: usize,
        exited: bool,
    }

    impl ScriptedProcess {
        fn new(polls_until_exit: Option<usize>) -> Self {
            Self {
                polls_until_exit,
                polls: 0,
                kill_fails: false,
                kills: 0,
                exited: false,
            }
        }
    }

    impl ServerProcess for ScriptedProcess {
        fn id(&self) -> Option<u32> {
            None
        }

        fn try_wait(&mut self) -> io::Result<Option<ServerExit>> {
            self.polls += 1;
            if self.exited || self.polls_until_exit.is_some_and(|limit| self.polls > limit) {
                self.exited = true;
                return Ok(Some(ServerExit { code: Some(0) }));
            }
            Ok(None)
        }

        fn kill(&mut self) -> io::Result<()> {
            self.kills += 1;
            if self.kill_fails {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            self.exited = true;
            Ok(())
        }

        fn wait(&mut self) -> io::Result<ServerExit> {
            Ok(ServerExit { code: None })
        }
    }

    #[rstest]
    fn returns_exit_when_process_leaves_in_time() {
        let mut process = ScriptedProcess::new(Some(2));

        let outcome = terminate(&mut process, Duration::from_secs(5), &AtomicBool::new(false));

        assert!(matches!(outcome, Termination::Exited(exit) if exit.success()));
        assert_eq!(process.kills, 0);
    }

    #[rstest]
    fn kills_after_grace_period() {
        let mut process = ScriptedProcess::new(None);

        let outcome = terminate(&mut process, Duration::from_millis(60), &AtomicBool::new(false));

        assert!(matches!(outcome, Termination::Killed));
        assert_eq!(process.kills, 1);
    }

    #[rstest]
    fn interrupt_skips_remaining_grace() {
        let mut process = ScriptedProcess::new(None);
        let started = Instant::now();

        let outcome = terminate(&mut process, Duration::from_secs(30), &AtomicBool::new(true));

        assert!(matches!(outcome, Termination::Killed));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[rstest]
    fn reports_failed_kill() {
        let mut process = ScriptedProcess::new(None);
        process.kill_fails = true;

        let outcome = terminate(&mut process, Duration::ZERO, &AtomicBool::new(false));

        assert!(matches!(outcome, Termination::KillFailed(_)));
    }
}
