//! Build event notifications, for the purpose of display to the user.

use crate::command::Command;
use crate::process::Termination;
use crate::signal;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Receives the events of running commands.  Called from the scheduler
/// thread and, for the start/finish events, from worker threads.
pub trait Delegate: Send + Sync {
    /// Called when a command starts gathering its inputs.
    fn command_preparing(&self, command: &Command);

    /// Called when a command's process is about to run.
    fn command_started(&self, command: &Command);

    /// Called when a command's process has ended, with its captured output.
    fn command_finished(&self, command: &Command, termination: Termination, output: &[u8]);

    /// Called once for every command that failed to run or couldn't run due
    /// to a missing input.
    fn had_command_failure(&self);

    /// Report a diagnostic.
    fn error(&self, message: &str);

    /// Whether the build was cancelled; commands that haven't run yet are
    /// then completed as cancelled.
    fn is_cancelled(&self) -> bool;
}

/// Delegate for a plain console, printing one line per event without any
/// overprinting.
#[derive(Default)]
pub struct ConsoleDelegate {
    /// Whether to print command lines of started programs.
    verbose: bool,

    failures: AtomicUsize,

    /// The name of the last command printed, used to avoid printing it twice
    /// when its start and finish come in a row.
    last_started: Mutex<Option<String>>,
}

impl ConsoleDelegate {
    pub fn new(verbose: bool) -> Self {
        ConsoleDelegate {
            verbose,
            ..Default::default()
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn log(&self, msg: &str) {
        println!("{}", msg);
    }

    fn set_last_started(&self, name: Option<&str>) -> Option<String> {
        let mut last = match self.last_started.lock() {
            Ok(last) => last,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *last, name.map(str::to_owned))
    }
}

impl Delegate for ConsoleDelegate {
    fn command_preparing(&self, command: &Command) {
        tracing::trace!("preparing {}", command.name());
    }

    fn command_started(&self, command: &Command) {
        match command.command_line() {
            Some(cmdline) if self.verbose => self.log(&cmdline.display()),
            _ => self.log(&command.message()),
        }
        self.set_last_started(Some(command.name()));
    }

    fn command_finished(&self, command: &Command, termination: Termination, output: &[u8]) {
        let last = self.set_last_started(None);
        match termination {
            Termination::Success => {
                if output.is_empty() || last.as_deref() == Some(command.name()) {
                    // Output is empty, or we just printed the command, don't print it again.
                } else {
                    self.log(&command.message())
                }
            }
            Termination::Interrupted => self.log(&format!("interrupted: {}", command.message())),
            Termination::Failure => self.log(&format!("failed: {}", command.message())),
        };
        if !output.is_empty() {
            let _ = std::io::stdout().write_all(output);
        }
    }

    fn had_command_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn error(&self, message: &str) {
        eprintln!("error: {}", message);
    }

    fn is_cancelled(&self) -> bool {
        signal::was_interrupted()
    }
}
