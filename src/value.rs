//! The values produced by evaluating nodes and commands within a build.

use crate::fs::FileInfo;
use crate::hash::Signature;

/// Outcome of evaluating a node or a command within one build attempt.
///
/// Node evaluation yields one of the "input" cases; command evaluation yields
/// one of the "command" cases.  Only `SuccessfulCommand` carries output
/// identities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildValue {
    /// A real input that exists, with its identity.
    ExistingInput(FileInfo),
    /// A source input that doesn't exist and that no command produces.
    MissingInput,
    /// An output of a successful command that wasn't actually produced.
    MissingOutput,
    /// An input whose producing command failed, was cancelled, or never ran.
    FailedInput,
    /// A node with no filesystem backing.
    VirtualInput,

    SuccessfulCommand {
        outputs: Vec<FileInfo>,
        signature: Signature,
    },
    FailedCommand,
    PropagatedFailureCommand,
    CancelledCommand,
    SkippedCommand,
}

impl BuildValue {
    pub fn is_successful_command(&self) -> bool {
        matches!(self, BuildValue::SuccessfulCommand { .. })
    }

    /// Whether this value reports the command as not having succeeded.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            BuildValue::FailedCommand
                | BuildValue::PropagatedFailureCommand
                | BuildValue::CancelledCommand
        )
    }

    /// The signature a successful command was computed with.
    pub fn command_signature(&self) -> Option<Signature> {
        match self {
            BuildValue::SuccessfulCommand { signature, .. } => Some(*signature),
            _ => None,
        }
    }

    /// Per-output identities of a successful command.
    /// Panics on any other value: asking for them is a caller bug.
    pub fn output_infos(&self) -> &[FileInfo] {
        match self {
            BuildValue::SuccessfulCommand { outputs, .. } => outputs,
            v => panic!("output info requested from {:?}", v),
        }
    }

    pub fn nth_output_info(&self, n: usize) -> &FileInfo {
        &self.output_infos()[n]
    }
}
