//! Commands: build steps with declared input and output nodes, and the
//! checks that decide whether a prior result of one can be reused.

use crate::fs::{FileInfo, FileSystem};
use crate::graph::Node;
use crate::hash::{Signature, SignatureHasher};
use crate::process::CommandLine;
use crate::value::BuildValue;
use std::sync::Arc;
use thiserror::Error;

/// A rejected configuration attribute.  The command shouldn't be used once
/// its configuration failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigureError {
    #[error("invalid value: '{value}' for attribute '{name}'")]
    InvalidValue { name: String, value: String },
    #[error("unexpected attribute: '{0}'")]
    UnexpectedAttribute(String),
}

/// Attributes specific to shell commands.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub args: Option<CommandLine>,
    /// Path of a Makefile-style dependency file the process writes.
    pub deps: Option<String>,
}

/// The kinds of command.  All kinds share the input/output protocol and
/// differ only in their attributes and in what running them means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Shell(ShellCommand),
    /// Runs nothing; used to group other commands' outputs.
    Phony,
}

#[derive(Debug)]
pub struct Command {
    name: String,
    kind: CommandKind,
    description: String,
    inputs: Vec<Arc<Node>>,
    outputs: Vec<Arc<Node>>,
    /// Run even if some input is missing and no command produces it.
    allow_missing_inputs: bool,
    /// Accept outputs modified since the last run, as long as they exist.
    allow_modified_outputs: bool,
    always_out_of_date: bool,
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigureError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigureError::InvalidValue {
            name: name.to_owned(),
            value: value.to_owned(),
        }),
    }
}

impl Command {
    pub fn new(name: impl Into<String>, kind: CommandKind) -> Self {
        Command {
            name: name.into(),
            kind,
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            allow_missing_inputs: false,
            allow_modified_outputs: false,
            always_out_of_date: false,
        }
    }

    pub fn shell(name: impl Into<String>) -> Self {
        Command::new(name, CommandKind::Shell(ShellCommand::default()))
    }

    pub fn phony(name: impl Into<String>) -> Self {
        Command::new(name, CommandKind::Phony)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }
    pub fn inputs(&self) -> &[Arc<Node>] {
        &self.inputs
    }
    pub fn outputs(&self) -> &[Arc<Node>] {
        &self.outputs
    }
    pub fn allow_missing_inputs(&self) -> bool {
        self.allow_missing_inputs
    }
    pub fn always_out_of_date(&self) -> bool {
        self.always_out_of_date
    }

    /// The name of the output identifying this command's result in messages.
    pub fn primary_output_name(&self) -> &str {
        self.outputs
            .first()
            .map(|node| node.name())
            .unwrap_or(self.name.as_str())
    }

    /// The message to display on the console for this command.
    pub fn message(&self) -> String {
        if !self.description.is_empty() {
            return self.description.clone();
        }
        match &self.kind {
            CommandKind::Shell(ShellCommand {
                args: Some(args), ..
            }) => args.display(),
            _ => self.name.clone(),
        }
    }

    /// The command line, if running this command runs a process.
    pub fn command_line(&self) -> Option<&CommandLine> {
        match &self.kind {
            CommandKind::Shell(shell) => shell.args.as_ref(),
            CommandKind::Phony => None,
        }
    }

    pub fn configure_description(&mut self, value: impl Into<String>) {
        self.description = value.into();
    }

    pub fn configure_inputs(&mut self, nodes: Vec<Arc<Node>>) {
        self.inputs = nodes;
    }

    pub fn configure_outputs(&mut self, nodes: Vec<Arc<Node>>) {
        self.outputs = nodes;
    }

    /// Set a scalar attribute.
    pub fn configure_attribute(&mut self, name: &str, value: &str) -> Result<(), ConfigureError> {
        match (&mut self.kind, name) {
            (_, "allow-missing-inputs") => self.allow_missing_inputs = parse_bool(name, value)?,
            (_, "allow-modified-outputs") => {
                self.allow_modified_outputs = parse_bool(name, value)?
            }
            (_, "always-out-of-date") => self.always_out_of_date = parse_bool(name, value)?,
            (_, "description") => self.description = value.to_owned(),
            (CommandKind::Shell(shell), "args") => {
                shell.args = Some(CommandLine::Shell(value.to_owned()))
            }
            (CommandKind::Shell(shell), "deps") => shell.deps = Some(value.to_owned()),
            _ => return Err(ConfigureError::UnexpectedAttribute(name.to_owned())),
        }
        Ok(())
    }

    /// Set a list-valued attribute.
    pub fn configure_list_attribute(
        &mut self,
        name: &str,
        values: &[&str],
    ) -> Result<(), ConfigureError> {
        match (&mut self.kind, name) {
            (CommandKind::Shell(shell), "args") => {
                shell.args = Some(CommandLine::Argv(
                    values.iter().map(|v| v.to_string()).collect(),
                ));
                Ok(())
            }
            _ => Err(ConfigureError::UnexpectedAttribute(name.to_owned())),
        }
    }

    /// Hash of everything that identifies what this command does.  A prior
    /// result is only reusable if it was computed with the same signature.
    pub fn signature(&self) -> Signature {
        let mut hasher = SignatureHasher::default();
        hasher.write_str(&self.name);
        hasher.write_names(self.inputs.iter().map(|node| node.name()));
        hasher.write_names(self.outputs.iter().map(|node| node.name()));
        hasher.write_bool(self.allow_missing_inputs);
        hasher.write_bool(self.allow_modified_outputs);
        hasher.write_bool(self.always_out_of_date);
        hasher.write_separator();
        if let CommandKind::Shell(shell) = &self.kind {
            match &shell.args {
                None => {}
                Some(CommandLine::Shell(cmdline)) => hasher.write_str(cmdline),
                Some(CommandLine::Argv(args)) => {
                    hasher.write_names(args.iter().map(|arg| arg.as_str()))
                }
            }
            hasher.write_separator();
            if let Some(deps) = &shell.deps {
                hasher.write_str(deps);
            }
        }
        hasher.finish()
    }

    /// Whether a prior result can stand as this build's result.
    ///
    /// Outputs that were missing and still are don't invalidate the result:
    /// commands are trusted to report their own failures, and a required
    /// missing output is diagnosed by whatever consumes it.  The flip side is
    /// that an output which disappears is never cleaned up.
    pub fn is_result_valid(&self, fs: &dyn FileSystem, value: &BuildValue) -> bool {
        if self.always_out_of_date {
            return false;
        }
        let signature = match value.command_signature() {
            None => return false,
            Some(signature) => signature,
        };
        if signature != self.signature() {
            return false;
        }
        let prior = value.output_infos();
        if prior.len() != self.outputs.len() {
            return false;
        }
        for (node, prior_info) in self.outputs.iter().zip(prior) {
            if node.is_virtual() {
                continue;
            }
            if node.file_info(fs) != *prior_info {
                tracing::debug!("{}: output {} changed", self.name, node.name());
                return false;
            }
        }
        true
    }

    /// The value a consumer of one of this command's outputs sees.
    pub fn result_for_output(&self, node: &Node, value: &BuildValue) -> BuildValue {
        if value.is_failure() {
            return BuildValue::FailedInput;
        }
        if let BuildValue::SkippedCommand = value {
            return BuildValue::SkippedCommand;
        }
        if node.is_virtual() {
            return BuildValue::VirtualInput;
        }
        let index = match self.outputs.iter().position(|out| out.name() == node.name()) {
            Some(index) => index,
            None => panic!("{} is not an output of {}", node.name(), self.name),
        };
        match value.nth_output_info(index) {
            FileInfo::Missing => BuildValue::MissingOutput,
            info => BuildValue::ExistingInput(*info),
        }
    }

    /// Snapshot the current output identities as a successful result.
    pub fn compute_result(&self, fs: &dyn FileSystem) -> BuildValue {
        BuildValue::SuccessfulCommand {
            outputs: self.outputs.iter().map(|node| node.file_info(fs)).collect(),
            signature: self.signature(),
        }
    }

    /// Whether a freshly computed `result` may stand in for running the
    /// command again: only if modified outputs are allowed and all of them
    /// exist.
    pub fn can_reuse_without_executing(&self, result: &BuildValue) -> bool {
        if !self.allow_modified_outputs {
            return false;
        }
        result.output_infos().iter().all(|info| !info.is_missing())
    }
}
