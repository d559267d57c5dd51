//! The state machine driving one external command through a build attempt:
//! request inputs, decide whether to skip, reuse or execute, and complete
//! with exactly one value.

use crate::command::{Command, CommandKind};
use crate::delegate::Delegate;
use crate::depfile;
use crate::fs::FileSystem;
use crate::graph::Node;
use crate::hash::Signature;
use crate::process::Termination;
use crate::task::{Job, JobContext, TaskResult};
use crate::value::BuildValue;
use std::path::Path;
use std::sync::Arc;

/// The scheduler's side of the protocol.
pub trait TaskInterface {
    fn delegate(&self) -> &Arc<dyn Delegate>;
    fn file_system(&self) -> &Arc<dyn FileSystem>;

    /// Ask for the value of a node; answered later through
    /// `CommandTask::provide_value` with the same `input_id`.
    fn request_input(&mut self, node: &Arc<Node>, input_id: usize);

    /// Hand off a job to run on the worker pool; its result comes back
    /// through `CommandTask::job_finished`.
    fn submit_job(&mut self, job: Job);

    /// Deliver this command's value for the current build attempt.
    fn complete(&mut self, value: BuildValue);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    AwaitingInputs,
    Executing,
    Completed,
}

/// Per-attempt scratch state, reset at `start`.
#[derive(Debug)]
struct RunState {
    /// Set once some input means the command can't run.
    skip_value: Option<BuildValue>,
    has_missing_input: bool,
    /// Cleared when an input turns out to be a missing output, in which case
    /// the command has to actually run.
    can_update_if_newer: bool,
    prior_signature: Option<Signature>,
}

impl Default for RunState {
    fn default() -> Self {
        RunState {
            skip_value: None,
            has_missing_input: false,
            can_update_if_newer: true,
            prior_signature: None,
        }
    }
}

pub struct CommandTask {
    command: Arc<Command>,
    state: TaskState,
    run: RunState,
}

impl CommandTask {
    pub fn new(command: Arc<Command>) -> Self {
        CommandTask {
            command,
            state: TaskState::Idle,
            run: RunState::default(),
        }
    }

    pub fn command(&self) -> &Arc<Command> {
        &self.command
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn start(&mut self, ti: &mut dyn TaskInterface) {
        assert_eq!(self.state, TaskState::Idle, "{} started twice", self.command.name());
        ti.delegate().command_preparing(&self.command);
        // The prior value may have been provided already.
        self.run = RunState {
            prior_signature: self.run.prior_signature.take(),
            ..RunState::default()
        };
        self.state = TaskState::AwaitingInputs;
        let command = self.command.clone();
        for (input_id, input) in command.inputs().iter().enumerate() {
            ti.request_input(input, input_id);
        }
    }

    /// Record the value this command had at the end of the previous build.
    pub fn provide_prior_value(&mut self, value: &BuildValue) {
        if let Some(signature) = value.command_signature() {
            self.run.prior_signature = Some(signature);
        }
    }

    pub fn provide_value(&mut self, ti: &mut dyn TaskInterface, input_id: usize, value: &BuildValue) {
        assert_eq!(self.state, TaskState::AwaitingInputs);
        match value {
            BuildValue::ExistingInput(_) | BuildValue::VirtualInput => {}
            BuildValue::SkippedCommand => {}
            BuildValue::MissingOutput => {
                self.run.can_update_if_newer = false;
            }
            BuildValue::MissingInput => {
                if self.command.allow_missing_inputs() {
                    return;
                }
                self.run.skip_value = Some(BuildValue::PropagatedFailureCommand);
                self.run.has_missing_input = true;
                ti.delegate().error(&format!(
                    "missing input '{}' and no rule to build it",
                    self.command.inputs()[input_id].name()
                ));
            }
            BuildValue::FailedInput => {
                self.run.skip_value = Some(BuildValue::PropagatedFailureCommand);
            }
            v => panic!("{}: unexpected input value {:?}", self.command.name(), v),
        }
    }

    /// Called once every requested input has been provided.
    pub fn inputs_available(&mut self, ti: &mut dyn TaskInterface) {
        assert_eq!(self.state, TaskState::AwaitingInputs);

        if ti.delegate().is_cancelled() {
            self.complete(ti, BuildValue::CancelledCommand);
            return;
        }

        if let Some(value) = self.run.skip_value.take() {
            if self.run.has_missing_input {
                ti.delegate().error(&format!(
                    "cannot build '{}' due to missing input",
                    self.command.primary_output_name()
                ));
                ti.delegate().had_command_failure();
            }
            self.complete(ti, value);
            return;
        }

        if self.run.can_update_if_newer
            && self.run.prior_signature == Some(self.command.signature())
        {
            let result = self.command.compute_result(ti.file_system().as_ref());
            if self.command.can_reuse_without_executing(&result) {
                tracing::debug!("{}: reusing outputs without running", self.command.name());
                self.complete(ti, result);
                return;
            }
        }

        self.state = TaskState::Executing;
        let job = execution_job(
            self.command.clone(),
            ti.delegate().clone(),
            ti.file_system().clone(),
        );
        ti.submit_job(job);
    }

    /// Called with the value a submitted job produced.
    pub fn job_finished(&mut self, ti: &mut dyn TaskInterface, value: BuildValue) {
        assert_eq!(self.state, TaskState::Executing);
        self.complete(ti, value);
    }

    fn complete(&mut self, ti: &mut dyn TaskInterface, value: BuildValue) {
        assert_ne!(
            self.state,
            TaskState::Completed,
            "{} completed twice",
            self.command.name()
        );
        self.state = TaskState::Completed;
        self.run = RunState::default();
        ti.complete(value);
    }
}

fn create_output_dirs(command: &Command, fs: &dyn FileSystem) {
    for node in command.outputs() {
        if node.is_virtual() {
            continue;
        }
        let parent = match Path::new(node.name()).parent().and_then(|p| p.to_str()) {
            Some(parent) if !parent.is_empty() => parent,
            _ => continue,
        };
        if let Err(err) = fs.create_dir_all(parent) {
            tracing::debug!("mkdir {}: {}", parent, err);
        }
    }
}

/// Runs the command's process, if it has one.
fn execute(
    command: &Command,
    delegate: &dyn Delegate,
    context: &dyn JobContext,
) -> (Termination, Vec<u8>) {
    let shell = match command.kind() {
        CommandKind::Phony => return (Termination::Success, Vec::new()),
        CommandKind::Shell(shell) => shell,
    };
    let cmdline = match &shell.args {
        Some(cmdline) => cmdline,
        None => {
            delegate.error("no configured 'args'");
            return (Termination::Failure, Vec::new());
        }
    };
    match context.run_process(cmdline) {
        Ok(result) => result,
        Err(err) => (Termination::Failure, err.to_string().into_bytes()),
    }
}

/// Reads the prerequisites of the first rule of a dependency file.
fn read_deps(fs: &dyn FileSystem, delegate: &dyn Delegate, path: &str) -> Option<Vec<String>> {
    let data = match fs.read(path) {
        Ok(data) => data,
        Err(err) => {
            tracing::debug!("read {}: {}", path, err);
            delegate.error(&format!("unable to open dependencies file '{}'", path));
            return None;
        }
    };
    let collected = depfile::collect(&data, true);
    if let Some(err) = collected.errors.first() {
        delegate.error(&format!(
            "error reading dependency file '{}' ({})",
            path, err.msg
        ));
        return None;
    }
    Some(
        collected
            .rules
            .into_iter()
            .flat_map(|rule| rule.deps)
            .collect(),
    )
}

fn execution_job(
    command: Arc<Command>,
    delegate: Arc<dyn Delegate>,
    fs: Arc<dyn FileSystem>,
) -> Job {
    Job::new(move |context| {
        delegate.command_started(&command);
        create_output_dirs(&command, fs.as_ref());
        let (termination, output) = execute(&command, delegate.as_ref(), context);
        delegate.command_finished(&command, termination, &output);

        let failed = TaskResult {
            value: BuildValue::FailedCommand,
            discovered_deps: None,
        };
        if termination != Termination::Success {
            delegate.had_command_failure();
            return failed;
        }

        let mut discovered_deps = None;
        if let CommandKind::Shell(shell) = command.kind() {
            if let Some(path) = &shell.deps {
                match read_deps(fs.as_ref(), delegate.as_ref(), path) {
                    Some(deps) => discovered_deps = Some(deps),
                    None => {
                        delegate.had_command_failure();
                        return failed;
                    }
                }
            }
        }

        TaskResult {
            value: command.compute_result(fs.as_ref()),
            discovered_deps,
        }
    })
}
